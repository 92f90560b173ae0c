//! Win/loss streaks over a chronological outcome sequence.

use serde::{Deserialize, Serialize};

use super::stats::Outcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streaks {
    pub longest_win: usize,
    pub longest_loss: usize,
    /// Consecutive wins ending at the last outcome
    pub current_win: usize,
    /// Consecutive losses ending at the last outcome
    pub current_loss: usize,
}

impl Streaks {
    /// A breakeven ends the running streak without starting a new one.
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let mut streaks = Streaks::default();

        for outcome in outcomes {
            match outcome {
                Outcome::Win => {
                    streaks.current_win += 1;
                    streaks.current_loss = 0;
                }
                Outcome::Loss => {
                    streaks.current_loss += 1;
                    streaks.current_win = 0;
                }
                Outcome::Breakeven => {
                    streaks.current_win = 0;
                    streaks.current_loss = 0;
                }
            }
            streaks.longest_win = streaks.longest_win.max(streaks.current_win);
            streaks.longest_loss = streaks.longest_loss.max(streaks.current_loss);
        }

        streaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::stats::Outcome::{Breakeven as B, Loss as L, Win as W};

    #[test]
    fn test_longest_streaks() {
        let streaks = Streaks::from_outcomes(&[W, L, L, L, W]);
        assert_eq!(streaks.longest_loss, 3);
        assert_eq!(streaks.longest_win, 1);
        assert_eq!(streaks.current_win, 1);
        assert_eq!(streaks.current_loss, 0);
    }

    #[test]
    fn test_breakeven_breaks_streak() {
        let streaks = Streaks::from_outcomes(&[L, L, B, L, L]);
        assert_eq!(streaks.longest_loss, 2);
        assert_eq!(streaks.current_loss, 2);

        let streaks = Streaks::from_outcomes(&[W, W, B]);
        assert_eq!(streaks.longest_win, 2);
        assert_eq!(streaks.current_win, 0);
    }

    #[test]
    fn test_empty() {
        assert_eq!(Streaks::from_outcomes(&[]), Streaks::default());
    }
}
