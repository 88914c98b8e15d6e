use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority level of a queued item.
///
/// The numeric value doubles as the slot index of a channel and as the offset
/// added to an integer queue id when deriving per-priority keys.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Priority {
    High = 0,
    #[default]
    Normal = 1,
    Low = 2,
}

impl Priority {
    /// All levels in scan order.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    /// Suffix appended to the queue id to name the high-priority channel.
    pub const HIGH_SUFFIX: &'static str = "_high";
    /// Suffix appended to the queue id to name the low-priority channel.
    pub const LOW_SUFFIX: &'static str = "_low";

    /// Map an integer onto a level, `None` for anything unrecognised.
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Priority::High),
            1 => Some(Priority::Normal),
            2 => Some(Priority::Low),
            _ => None,
        }
    }

    /// Coerce any priority-like value, falling back to [`Priority::Normal`].
    pub fn resolve<P: AsPriority>(priority: P) -> Self {
        priority
            .as_raw()
            .and_then(Self::from_raw)
            .unwrap_or(Priority::Normal)
    }

    pub fn as_raw(self) -> i64 {
        self as i64
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Channel name suffix for this level. `Normal` uses the bare id.
    pub fn suffix(self) -> &'static str {
        match self {
            Priority::High => Self::HIGH_SUFFIX,
            Priority::Normal => "",
            Priority::Low => Self::LOW_SUFFIX,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        f.write_str(name)
    }
}

/// Anything a caller may hand in as a priority.
///
/// Values are coerced to an integer first; `None` means "no priority given".
/// Strings follow leading-integer rules, so `"2"` and `" 2 apples"` are both
/// `Low` while `"high"` coerces to 0.
pub trait AsPriority {
    fn as_raw(&self) -> Option<i64>;
}

impl AsPriority for Priority {
    fn as_raw(&self) -> Option<i64> {
        Some(Priority::as_raw(*self))
    }
}

macro_rules! int_priority {
    ($($t:ty),*) => {
        $(
            impl AsPriority for $t {
                fn as_raw(&self) -> Option<i64> {
                    i64::try_from(*self).ok()
                }
            }
        )*
    };
}

int_priority!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl AsPriority for &str {
    fn as_raw(&self) -> Option<i64> {
        Some(leading_int(self))
    }
}

impl AsPriority for String {
    fn as_raw(&self) -> Option<i64> {
        Some(leading_int(self))
    }
}

impl<P: AsPriority> AsPriority for Option<P> {
    fn as_raw(&self) -> Option<i64> {
        self.as_ref().and_then(AsPriority::as_raw)
    }
}

/// True iff `priority` is present and coerces exactly to one of the three levels.
pub fn is_priority<P: AsPriority>(priority: P) -> bool {
    priority.as_raw().and_then(Priority::from_raw).is_some()
}

/// Integer coercion of a string: optional whitespace and sign, then leading
/// digits. Anything unparsable yields 0, overflow saturates.
pub(crate) fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        let digit = i64::from(b - b'0');
        value = value.saturating_mul(10).saturating_add(digit);
    }

    if negative {
        -value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_priorities() {
        for p in Priority::ALL {
            assert!(is_priority(p));
            assert!(is_priority(p.as_raw()));
        }
    }

    #[test]
    fn test_other_values_are_not_priorities() {
        assert!(!is_priority(None::<Priority>));
        assert!(!is_priority(-1));
        assert!(!is_priority(3));
        assert!(!is_priority(99));
        assert!(!is_priority(u64::MAX));
    }

    #[test]
    fn test_string_coercion() {
        assert!(is_priority("2"));
        assert_eq!(Priority::resolve(" 2 apples"), Priority::Low);
        // "high" coerces to 0, which is a valid level
        assert_eq!(Priority::resolve("high"), Priority::High);
        assert_eq!(leading_int("-17x"), -17);
        assert_eq!(leading_int(""), 0);
    }

    #[test]
    fn test_resolve_falls_back_to_normal() {
        assert_eq!(Priority::resolve(99), Priority::Normal);
        assert_eq!(Priority::resolve(None::<i32>), Priority::Normal);
        assert_eq!(Priority::resolve(Some(Priority::Low)), Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_scan_order() {
        assert_eq!(
            Priority::ALL,
            [Priority::High, Priority::Normal, Priority::Low]
        );
        assert!(Priority::High < Priority::Normal);
    }
}
