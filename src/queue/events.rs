//! Lifecycle hooks fired around push and pop.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::QueueError;

/// Points in the push/pop lifecycle a hook can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueEvent {
    BeforePush,
    AfterPush,
    ErrorPush,
    BeforePop,
    AfterPop,
    ErrorPop,
}

impl QueueEvent {
    pub const ALL: [QueueEvent; 6] = [
        QueueEvent::BeforePush,
        QueueEvent::AfterPush,
        QueueEvent::ErrorPush,
        QueueEvent::BeforePop,
        QueueEvent::AfterPop,
        QueueEvent::ErrorPop,
    ];

    pub fn name(self) -> &'static str {
        match self {
            QueueEvent::BeforePush => "before-push",
            QueueEvent::AfterPush => "after-push",
            QueueEvent::ErrorPush => "error-push",
            QueueEvent::BeforePop => "before-pop",
            QueueEvent::AfterPop => "after-pop",
            QueueEvent::ErrorPop => "error-pop",
        }
    }
}

impl fmt::Display for QueueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QueueEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueEvent::ALL
            .into_iter()
            .find(|event| event.name() == s)
            .ok_or_else(|| format!("unknown queue event: {}", s))
    }
}

/// Arguments handed to a hook. The variant always matches the event fired.
///
/// `priority` is the value the caller asked for, before coercion; `None`
/// means no priority was given.
#[derive(Debug)]
pub enum HookContext<'a> {
    BeforePush {
        item: &'a Value,
        priority: Option<i64>,
    },
    AfterPush {
        item: &'a Value,
        priority: Option<i64>,
        status: bool,
    },
    ErrorPush {
        error: &'a QueueError,
    },
    BeforePop {
        priority: Option<i64>,
    },
    AfterPop {
        item: Option<&'a Value>,
        priority: Option<i64>,
    },
    ErrorPop {
        error: &'a QueueError,
        priority: Option<i64>,
    },
}

impl HookContext<'_> {
    pub fn event(&self) -> QueueEvent {
        match self {
            HookContext::BeforePush { .. } => QueueEvent::BeforePush,
            HookContext::AfterPush { .. } => QueueEvent::AfterPush,
            HookContext::ErrorPush { .. } => QueueEvent::ErrorPush,
            HookContext::BeforePop { .. } => QueueEvent::BeforePop,
            HookContext::AfterPop { .. } => QueueEvent::AfterPop,
            HookContext::ErrorPop { .. } => QueueEvent::ErrorPop,
        }
    }
}

/// A registered callback. Its return value, if any, is discarded.
pub type Hook = Box<dyn Fn(&HookContext<'_>) + Send + Sync>;

/// At most one hook per event.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<QueueEvent, Hook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` for `event`.
    ///
    /// An existing hook is only overwritten when `replace` is set; otherwise
    /// the call is a no-op. Returns whether `hook` was stored.
    pub fn on(&mut self, event: QueueEvent, hook: Hook, replace: bool) -> bool {
        if !replace && self.hooks.contains_key(&event) {
            return false;
        }
        self.hooks.insert(event, hook);
        true
    }

    /// Remove and return the hook for `event`.
    pub fn off(&mut self, event: QueueEvent) -> Option<Hook> {
        self.hooks.remove(&event)
    }

    pub fn contains(&self, event: QueueEvent) -> bool {
        self.hooks.contains_key(&event)
    }

    pub(crate) fn fire(&self, context: &HookContext<'_>) {
        if let Some(hook) = self.hooks.get(&context.event()) {
            hook(context);
        }
    }

    pub fn clear(&mut self) {
        self.hooks.clear();
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.hooks.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>, step: usize) -> Hook {
        let counter = counter.clone();
        Box::new(move |_| {
            counter.fetch_add(step, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_second_registration_is_ignored_without_replace() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = HookRegistry::new();

        assert!(registry.on(QueueEvent::BeforePop, counting(&counter, 1), false));
        assert!(!registry.on(QueueEvent::BeforePop, counting(&counter, 10), false));

        registry.fire(&HookContext::BeforePop { priority: None });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_replace_overwrites() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = HookRegistry::new();

        registry.on(QueueEvent::BeforePop, counting(&counter, 1), false);
        assert!(registry.on(QueueEvent::BeforePop, counting(&counter, 10), true));

        registry.fire(&HookContext::BeforePop { priority: Some(1) });
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_off_returns_previous_hook() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = HookRegistry::new();
        registry.on(QueueEvent::AfterPop, counting(&counter, 1), false);

        let hook = registry.off(QueueEvent::AfterPop).expect("hook registered");
        assert!(registry.is_empty());
        assert!(registry.off(QueueEvent::AfterPop).is_none());

        hook(&HookContext::AfterPop {
            item: None,
            priority: None,
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fire_only_matching_event() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = HookRegistry::new();
        registry.on(QueueEvent::BeforePush, counting(&counter, 1), false);

        registry.fire(&HookContext::BeforePop { priority: None });
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_event_names_round_trip() {
        for event in QueueEvent::ALL {
            assert_eq!(event.name().parse::<QueueEvent>(), Ok(event));
        }
        assert!("after-everything".parse::<QueueEvent>().is_err());
    }
}
