use crate::models::ScanDefaults;
use std::ops::RangeInclusive;

/// What a scanner tick has to do after observing a new head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickPlan {
    /// First head seen. `backfill` is scanned slowly, newest first.
    Initialize {
        head: u64,
        backfill: Option<RangeInclusive<u64>>,
    },
    /// Gap exceeded the threshold; `skipped` is abandoned.
    Resync {
        head: u64,
        skipped: RangeInclusive<u64>,
    },
    Enqueue(RangeInclusive<u64>),
    Idle,
}

/// In-memory block/slot cursor of one scanner.
#[derive(Debug, Clone)]
pub struct ScanCursor {
    last: Option<u64>,
    confirmation_offset: u64,
    backfill_offset: i64,
    max_gap: u64,
}

impl ScanCursor {
    pub fn new(defaults: ScanDefaults, max_gap: u64) -> Self {
        Self {
            last: None,
            confirmation_offset: defaults.confirmation_offset,
            backfill_offset: defaults.backfill_offset,
            max_gap,
        }
    }

    pub fn position(&self) -> Option<u64> {
        self.last
    }

    /// Folds a freshly fetched head into the cursor. The cursor never moves backwards.
    pub fn advance(&mut self, raw_head: u64, confirmed_mode: bool) -> TickPlan {
        let head = if confirmed_mode {
            raw_head.saturating_sub(self.confirmation_offset)
        } else {
            raw_head
        };

        let Some(last) = self.last else {
            self.last = Some(head);
            let backfill = (self.backfill_offset < 0 && head > 0).then(|| {
                head.saturating_sub(self.backfill_offset.unsigned_abs())..=head
            });
            return TickPlan::Initialize { head, backfill };
        };

        if head <= last {
            return TickPlan::Idle;
        }

        self.last = Some(head);
        if head - last > self.max_gap {
            return TickPlan::Resync {
                head,
                skipped: last + 1..=head,
            };
        }
        TickPlan::Enqueue(last + 1..=head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Network;

    fn cursor() -> ScanCursor {
        ScanCursor::new(Network::Polygon.scan_defaults(), 1000)
    }

    #[test]
    fn first_head_schedules_backfill() {
        let mut c = cursor();
        assert_eq!(
            c.advance(10_000, false),
            TickPlan::Initialize {
                head: 10_000,
                backfill: Some(9_400..=10_000)
            }
        );
        assert_eq!(c.position(), Some(10_000));
    }

    #[test]
    fn steady_ticks_enqueue_the_new_range() {
        let mut c = cursor();
        c.advance(100, false);
        assert_eq!(c.advance(105, false), TickPlan::Enqueue(101..=105));
        assert_eq!(c.advance(105, false), TickPlan::Idle);
        assert_eq!(c.position(), Some(105));
    }

    #[test]
    fn lagging_head_never_moves_cursor_back() {
        let mut c = cursor();
        c.advance(500, false);
        assert_eq!(c.advance(480, false), TickPlan::Idle);
        assert_eq!(c.position(), Some(500));
    }

    #[test]
    fn large_gap_forces_resync() {
        let mut c = cursor();
        c.advance(100, false);
        assert_eq!(
            c.advance(5_000, false),
            TickPlan::Resync {
                head: 5_000,
                skipped: 101..=5_000
            }
        );
        assert_eq!(c.position(), Some(5_000));
        assert_eq!(c.advance(5_002, false), TickPlan::Enqueue(5_001..=5_002));
    }

    #[test]
    fn gap_at_threshold_is_still_scanned() {
        let mut c = cursor();
        c.advance(100, false);
        assert_eq!(c.advance(1_100, false), TickPlan::Enqueue(101..=1_100));
    }

    #[test]
    fn confirmed_mode_subtracts_offset() {
        let mut c = cursor();
        c.advance(1_000, true);
        assert_eq!(c.position(), Some(960));
        assert_eq!(c.advance(1_010, true), TickPlan::Enqueue(961..=970));
    }

    #[test]
    fn small_heads_saturate() {
        let mut c = ScanCursor::new(Network::Solana.scan_defaults(), 1000);
        assert_eq!(
            c.advance(30, true),
            TickPlan::Initialize {
                head: 0,
                backfill: None
            }
        );
        assert_eq!(
            ScanCursor::new(Network::Solana.scan_defaults(), 1000).advance(200, false),
            TickPlan::Initialize {
                head: 200,
                backfill: Some(0..=200)
            }
        );
    }

    #[test]
    fn cursor_is_monotonic_across_ticks() {
        let mut c = cursor();
        let heads = [50u64, 52, 51, 60, 60, 58, 2_000, 1_990, 2_010];
        let mut previous = 0;
        for head in heads {
            c.advance(head, false);
            let now = c.position().unwrap();
            assert!(now >= previous);
            previous = now;
        }
        assert_eq!(previous, 2_010);
    }
}
