//! Touch worker: the edge reader feeding the debouncer, and the dispatcher
//! that republishes clean touches on the machine's stream.
//!
//! Both run on one thread. The hardware wait is bounded by the configured
//! poll interval so the worker notices shutdown even when the line is
//! quiet.

use crate::config::MachineConfig;
use crate::debounce::{ConfirmPolicy, Touch, TouchDebouncer};
use crate::hal::{HalError, InputLine};
use crate::shutdown::ShutdownSignal;
use crossbeam_channel::{select, Sender};
use log::{debug, error, info};
use std::time::{Duration, Instant};

pub struct EdgeReader<I: InputLine> {
    input: I,
    debouncer: TouchDebouncer,
    policy: ConfirmPolicy,
    poll: Duration,
}

impl<I: InputLine> EdgeReader<I> {
    pub fn new(input: I, config: &MachineConfig) -> Self {
        Self {
            input,
            debouncer: TouchDebouncer::new(config.debounce),
            policy: config.confirm,
            poll: config.shutdown_poll,
        }
    }

    /// Wait up to one poll interval for the next clean transition.
    ///
    /// Returns `Ok(None)` when the wait ended without an edge and nothing
    /// was due for re-evaluation, or when the observed level produced no
    /// transition.
    pub fn next_touch(&mut self) -> Result<Option<Touch>, HalError> {
        let recheck_at = match self.policy {
            ConfirmPolicy::Recheck => self.debouncer.pending_deadline(),
            ConfirmPolicy::EdgeOnly => None,
        };
        let timeout = match recheck_at {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(self.poll),
            None => self.poll,
        };

        let edge = self.input.wait_for_edge(timeout)?;
        let now = Instant::now();
        let due = recheck_at.is_some_and(|deadline| now > deadline);
        if !edge && !due {
            return Ok(None);
        }

        let level = self.input.read()?;
        Ok(self.debouncer.observe(level, now))
    }

    pub fn pin(&self) -> u8 {
        self.input.pin()
    }
}

pub struct TouchDispatcher<I: InputLine> {
    reader: EdgeReader<I>,
    events: Sender<Touch>,
    shutdown: ShutdownSignal,
}

impl<I: InputLine> TouchDispatcher<I> {
    pub fn new(reader: EdgeReader<I>, events: Sender<Touch>, shutdown: ShutdownSignal) -> Self {
        Self {
            reader,
            events,
            shutdown,
        }
    }

    pub fn run(mut self) -> Result<(), HalError> {
        info!("Handling touch events on GPIO {}", self.reader.pin());

        loop {
            if self.shutdown.is_signalled() {
                info!("Touch worker received shutdown");
                return Ok(());
            }

            let touch = match self.reader.next_touch() {
                Ok(Some(touch)) => touch,
                Ok(None) => continue,
                Err(e) => {
                    error!("Touch line failed: {}", e);
                    return Err(e);
                }
            };

            debug!("Touch {}", touch.as_str());

            select! {
                send(self.events, touch) -> res => {
                    if res.is_err() {
                        debug!("Touch stream has no receivers, dropping {}", touch.as_str());
                    }
                }
                recv(self.shutdown.receiver()) -> _ => {
                    info!("Touch worker received shutdown while forwarding");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{GpioHost, Pull};
    use crate::hal_sim::{SimHost, SimTouchPad};
    use std::thread;

    fn reader(confirm: ConfirmPolicy) -> (EdgeReader<crate::hal_sim::SimInput>, SimTouchPad) {
        let mut host = SimHost::new();
        let pad = host.touch_pad(4);
        let input = host.claim_input(4, Pull::Down).unwrap();
        let config = MachineConfig {
            confirm,
            shutdown_poll: Duration::from_millis(20),
            ..MachineConfig::default()
        };
        (EdgeReader::new(input, &config), pad)
    }

    fn drain(reader: &mut EdgeReader<crate::hal_sim::SimInput>, polls: usize) -> Vec<Touch> {
        (0..polls)
            .filter_map(|_| reader.next_touch().unwrap())
            .collect()
    }

    #[test]
    fn quiet_line_times_out_without_events() {
        let (mut reader, _pad) = reader(ConfirmPolicy::Recheck);
        let started = Instant::now();
        assert_eq!(reader.next_touch().unwrap(), None);
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn recheck_confirms_clean_press_without_further_edges() {
        let (mut reader, pad) = reader(ConfirmPolicy::Recheck);
        pad.press();
        assert_eq!(drain(&mut reader, 4), vec![Touch::Started]);
        pad.release();
        assert_eq!(drain(&mut reader, 2), vec![Touch::Ended]);
    }

    #[test]
    fn edge_only_waits_for_a_later_edge() {
        let (mut reader, pad) = reader(ConfirmPolicy::EdgeOnly);
        pad.press();
        assert!(drain(&mut reader, 3).is_empty());

        // A bounce while still high is the next evaluation opportunity.
        pad.bounce();
        assert_eq!(drain(&mut reader, 1), vec![Touch::Started]);
    }

    #[test]
    fn edge_only_drops_press_that_never_bounces() {
        let (mut reader, pad) = reader(ConfirmPolicy::EdgeOnly);
        pad.press();
        thread::sleep(Duration::from_millis(5));
        pad.release();
        assert!(drain(&mut reader, 3).is_empty());
    }

    #[test]
    fn glitch_shorter_than_threshold_is_ignored() {
        let (mut reader, pad) = reader(ConfirmPolicy::Recheck);
        pad.press();
        pad.release();
        assert!(drain(&mut reader, 4).is_empty());
    }
}
