//! Caller attribution records

use crate::frame::Frame;
use serde::{Deserialize, Serialize};

/// One attributed call: the called frame and the nearest open frame at call time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "self")]
    pub callee: Frame,
    pub caller: Frame,
}

impl Record {
    pub fn new(callee: Frame, caller: Frame) -> Self {
        Self { callee, caller }
    }

    /// Record whose caller is the ROOT sentinel
    pub fn from_root(callee: Frame) -> Self {
        Self::new(callee, Frame::root())
    }

    pub fn has_root_caller(&self) -> bool {
        self.caller.is_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_root() {
        let rec = Record::from_root(Frame::identity("Obj", "work"));
        assert!(rec.has_root_caller());
        assert_eq!(rec.callee.method_name, "work");
    }

    #[test]
    fn test_json_uses_self_key() {
        let rec = Record::from_root(Frame::identity("Obj", "work"));
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["self"]["entity"], "Obj");
        assert_eq!(json["caller"]["entity"], "<ROOT>");
    }
}
