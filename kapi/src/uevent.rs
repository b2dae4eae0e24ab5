//! Record of emitted uevents, what `udevadm monitor --kernel` would print.
//!
//! References: <https://elixir.bootlin.com/linux/v6.6/source/lib/kobject_uevent.c>

use core::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use alloc::{collections::VecDeque, format, string::String, vec::Vec};
use spin::Mutex;

const UEVENT_LOG_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UeventAction {
    Add,
    Remove,
}

impl UeventAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            UeventAction::Add => "add",
            UeventAction::Remove => "remove",
        }
    }
}

impl fmt::Display for UeventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uevent {
    pub seqnum: u64,
    pub action: UeventAction,
    pub devpath: String,
    /// `KEY=value` pairs in emission order.
    pub env: Vec<String>,
}

impl Uevent {
    /// Value of the environment variable `key`.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.env.iter().find_map(|var| {
            var.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }
}

impl fmt::Display for Uevent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KERNEL[{}] {} {}", self.seqnum, self.action, self.devpath)
    }
}

static UEVENT_SEQNUM: AtomicU64 = AtomicU64::new(0);
static UEVENTS: Mutex<VecDeque<Uevent>> = Mutex::new(VecDeque::new());

/// Stamps `env` with the next `SEQNUM` and broadcasts it.
pub(crate) fn emit(action: UeventAction, devpath: &str, mut env: Vec<String>) -> u64 {
    let seqnum = UEVENT_SEQNUM.fetch_add(1, Ordering::Relaxed) + 1;
    env.push(format!("SEQNUM={}", seqnum));
    let event = Uevent {
        seqnum,
        action,
        devpath: String::from(devpath),
        env,
    };
    log::debug!("uevent: {}", event);
    let mut events = UEVENTS.lock();
    if events.len() == UEVENT_LOG_LEN {
        events.pop_front();
    }
    events.push_back(event);
    seqnum
}

/// Snapshot of the recorded uevents, oldest first.
pub fn uevents() -> Vec<Uevent> {
    UEVENTS.lock().iter().cloned().collect()
}

pub fn uevents_clear() {
    UEVENTS.lock().clear();
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn test_emit_appends_seqnum() {
        let _guard = crate::testing::serial();
        let env = vec![String::from("ACTION=add"), String::from("DEVMODE=0666")];
        let seqnum = emit(UeventAction::Add, "/devices/virtual/test/test0", env);
        let event = uevents()
            .into_iter()
            .find(|event| event.seqnum == seqnum)
            .unwrap();
        assert_eq!(event.var("DEVMODE"), Some("0666"));
        assert_eq!(event.var("DEV"), None);
        assert_eq!(event.var("SEQNUM"), Some(format!("{}", seqnum).as_str()));
        assert_eq!(
            format!("{}", event),
            format!("KERNEL[{}] add /devices/virtual/test/test0", seqnum)
        );
    }

    #[test]
    fn test_log_is_bounded() {
        let _guard = crate::testing::serial();
        uevents_clear();
        for _ in 0..UEVENT_LOG_LEN + 1 {
            emit(UeventAction::Remove, "/devices/virtual/test/test1", Vec::new());
        }
        assert_eq!(uevents().len(), UEVENT_LOG_LEN);
    }
}
