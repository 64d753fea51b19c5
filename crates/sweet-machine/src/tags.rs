use serde::{Deserialize, Serialize};
use std::fmt;

/// The three hardware lines the machine owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineRole {
    Touch,
    Motor,
    Buzzer,
}

impl LineRole {
    pub fn tag(self) -> Tag {
        match self {
            LineRole::Touch => TOUCH,
            LineRole::Motor => MOTOR,
            LineRole::Buzzer => BUZZER,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.tag().key
    }
}

impl fmt::Display for LineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub thread: &'static str,
}

pub const TOUCH: Tag = Tag {
    key: "touch",
    thread: "sweet-touch",
};

pub const MOTOR: Tag = Tag {
    key: "motor",
    thread: "sweet-motor",
};

pub const BUZZER: Tag = Tag {
    key: "buzzer",
    thread: "sweet-buzzer",
};
