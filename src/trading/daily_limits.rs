//! Realized P&L guard that halts new entries for the rest of a UTC day.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::strategy::EntryValidation;

#[derive(Debug, Clone)]
pub struct DailyPnlGuard {
    max_daily_loss: Decimal,
    max_daily_profit: Decimal,
    realized_today: Decimal,
    exits_today: u32,
    reset_date: NaiveDate,
}

impl DailyPnlGuard {
    pub fn new(max_daily_loss: Decimal, max_daily_profit: Decimal) -> Self {
        Self::starting_at(max_daily_loss, max_daily_profit, Utc::now())
    }

    pub fn starting_at(max_daily_loss: Decimal, max_daily_profit: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            max_daily_loss,
            max_daily_profit,
            realized_today: Decimal::ZERO,
            exits_today: 0,
            reset_date: now.date_naive(),
        }
    }

    fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today > self.reset_date {
            info!(
                previous = %self.reset_date,
                realized = %self.realized_today,
                exits = self.exits_today,
                "Daily P&L counters reset"
            );
            self.realized_today = Decimal::ZERO;
            self.exits_today = 0;
            self.reset_date = today;
        }
    }

    /// Record the realized P&L of an exit.
    pub fn record_at(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        self.roll(now);
        self.realized_today += pnl;
        self.exits_today += 1;
    }

    pub fn record(&mut self, pnl: Decimal) {
        self.record_at(pnl, Utc::now());
    }

    /// Whether new entries are still allowed today.
    pub fn check_at(&mut self, now: DateTime<Utc>) -> EntryValidation {
        self.roll(now);

        if self.realized_today <= -self.max_daily_loss {
            warn!(realized = %self.realized_today, limit = %self.max_daily_loss, "Daily loss limit reached");
            return EntryValidation::deny(format!(
                "Daily loss limit reached: {} <= -{}",
                self.realized_today, self.max_daily_loss
            ));
        }
        if self.realized_today >= self.max_daily_profit {
            info!(realized = %self.realized_today, limit = %self.max_daily_profit, "Daily profit limit reached");
            return EntryValidation::deny(format!(
                "Daily profit limit reached: {} >= {}",
                self.realized_today, self.max_daily_profit
            ));
        }

        EntryValidation::pass()
    }

    pub fn check(&mut self) -> EntryValidation {
        self.check_at(Utc::now())
    }

    #[cfg(test)]
    pub fn realized_today(&self) -> Decimal {
        self.realized_today
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_loss_limit_halts_entries() {
        let now = morning();
        let mut guard = DailyPnlGuard::starting_at(dec!(500), dec!(500), now);

        guard.record_at(dec!(-300), now);
        assert!(guard.check_at(now).allowed);

        guard.record_at(dec!(-200), now);
        let check = guard.check_at(now);
        assert!(!check.allowed);
        assert!(check.reason.contains("loss"));
    }

    #[test]
    fn test_profit_limit_halts_entries() {
        let now = morning();
        let mut guard = DailyPnlGuard::starting_at(dec!(500), dec!(500), now);

        guard.record_at(dec!(650), now);
        assert!(guard.check_at(now).reason.contains("profit"));
    }

    #[test]
    fn test_resets_on_new_utc_day() {
        let now = morning();
        let mut guard = DailyPnlGuard::starting_at(dec!(500), dec!(500), now);
        guard.record_at(dec!(-600), now);
        assert!(!guard.check_at(now + Duration::hours(2)).allowed);

        let tomorrow = now + Duration::days(1);
        assert!(guard.check_at(tomorrow).allowed);
        assert_eq!(guard.realized_today(), Decimal::ZERO);
    }
}
