use chrono::{DateTime, Local};

/// `HH:MM` timestamp used in message headers and notifications.
pub fn clock_hhmm(t: DateTime<Local>) -> String {
    t.format("%H:%M").to_string()
}

/// `HH:MM:SS` used in the /who "On Since" column for same-day logins.
pub fn clock_hhmmss(t: DateTime<Local>) -> String {
    t.format("%H:%M:%S").to_string()
}

/// `Mon dd` used in the /who "On Since" column for older logins.
pub fn month_day(t: DateTime<Local>) -> String {
    t.format("%b %e").to_string()
}

/// Full `ctime`-style date, for /date.
pub fn full_date(t: DateTime<Local>) -> String {
    t.format("%a %b %e %H:%M:%S %Y").to_string()
}

/// Idle time broken into the units the reports use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSpan {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
}

impl IdleSpan {
    pub fn from_minutes(total: i64) -> Self {
        let hours = total / 60;
        let minutes = total - hours * 60;
        let days = hours / 24;
        let hours = hours - days * 24;
        Self { days, hours, minutes }
    }

    pub fn is_zero(&self) -> bool {
        self.days == 0 && self.hours == 0 && self.minutes == 0
    }
}

fn plural(n: i64) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// The `[You were idle for ...]` sentence body, without brackets.
/// Mirrors the grammar of the idle report: "exactly" when there are no
/// spare minutes, an "and" before the final unit.
pub fn idle_sentence(span: IdleSpan) -> String {
    let mut s = String::from("You were idle for");
    if span.minutes == 0 {
        s.push_str(" exactly");
    }
    if span.days != 0 {
        s.push_str(&format!(" {} day{}", span.days, plural(span.days)));
        if span.hours != 0 && span.minutes != 0 {
            s.push(',');
        } else if span.hours != 0 || span.minutes != 0 {
            s.push_str(" and");
        }
    }
    if span.hours != 0 {
        s.push_str(&format!(
            " {} hour{}{}",
            span.hours,
            plural(span.hours),
            if span.minutes != 0 { " and" } else { "" }
        ));
    }
    if span.minutes != 0 {
        s.push_str(&format!(" {} minute{}", span.minutes, plural(span.minutes)));
    }
    s.push('.');
    s
}

/// The /who idle column: days and hours:minutes, right-sized to 8 columns.
pub fn who_idle_column(span: IdleSpan, attached: bool) -> String {
    if span.is_zero() {
        return "         ".into();
    }
    if span.days > 9 || (span.days > 0 && !attached) {
        format!("{:2}d{:02}:{:02} ", span.days, span.hours, span.minutes)
    } else if span.days > 0 {
        format!("{}d{:02}:{:02}  ", span.days, span.hours, span.minutes)
    } else if span.hours > 0 {
        format!("  {:2}:{:02}  ", span.hours, span.minutes)
    } else {
        format!("     {:2}  ", span.minutes)
    }
}

/// The shorter /idle column (5 visible columns).
pub fn idle_column(span: IdleSpan) -> String {
    if span.is_zero() {
        return "     ".into();
    }
    if span.days > 9 {
        format!("{:2}d{:02}", span.days, span.hours)
    } else if span.days > 0 {
        format!("{}d{:02}h", span.days, span.hours)
    } else if span.hours > 0 {
        format!("{:2}:{:02}", span.hours, span.minutes)
    } else {
        format!("   {:2}", span.minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans() {
        let s = IdleSpan::from_minutes(1_565); // 1 day, 2 hours, 5 minutes
        assert_eq!(s, IdleSpan { days: 1, hours: 2, minutes: 5 });
        assert!(IdleSpan::from_minutes(0).is_zero());
    }

    #[test]
    fn sentences() {
        assert_eq!(
            idle_sentence(IdleSpan::from_minutes(1_565)),
            "You were idle for 1 day, 2 hours and 5 minutes."
        );
        assert_eq!(
            idle_sentence(IdleSpan::from_minutes(60)),
            "You were idle for exactly 1 hour."
        );
        assert_eq!(
            idle_sentence(IdleSpan::from_minutes(2)),
            "You were idle for 2 minutes."
        );
        assert_eq!(
            idle_sentence(IdleSpan::from_minutes(1_440)),
            "You were idle for exactly 1 day."
        );
    }

    #[test]
    fn who_columns() {
        assert_eq!(who_idle_column(IdleSpan::from_minutes(0), true), "         ");
        assert_eq!(who_idle_column(IdleSpan::from_minutes(5), true), "      5  ");
        assert_eq!(who_idle_column(IdleSpan::from_minutes(65), true), "   1:05  ");
        assert_eq!(who_idle_column(IdleSpan::from_minutes(1_565), true), "1d02:05  ");
        assert_eq!(who_idle_column(IdleSpan::from_minutes(1_565), false), " 1d02:05 ");
    }

    #[test]
    fn idle_columns() {
        assert_eq!(idle_column(IdleSpan::from_minutes(0)), "     ");
        assert_eq!(idle_column(IdleSpan::from_minutes(9)), "    9");
        assert_eq!(idle_column(IdleSpan::from_minutes(70)), " 1:10");
        assert_eq!(idle_column(IdleSpan::from_minutes(1_500)), "1d01h");
    }
}
