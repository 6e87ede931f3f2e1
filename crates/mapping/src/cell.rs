//! Occupancy cells and their update functions.

/// Common behavior of grid cells.
///
/// A cell kind pairs with a functions struct holding its update rules (see
/// [`LogOddsFunctions`]); the grid is parameterized by the cell kind, so
/// dispatch is static.
pub trait Cell: Clone + Default + Send + Sync + 'static {
    /// Raw cell value; zero means untouched/unknown.
    fn value(&self) -> f64;
    fn is_occupied(&self) -> bool;
    fn is_free(&self) -> bool;
    /// Reset to the prior (unknown) state.
    fn reset(&mut self);
}

/// Log-odds occupancy cell.
///
/// The update index tags the last scan pass that wrote the cell, so a single
/// scan never updates a cell twice in the same direction.
#[derive(Debug, Clone, Copy)]
pub struct LogOddsCell {
    log_odds: f64,
    update_index: i64,
}

impl Default for LogOddsCell {
    fn default() -> Self {
        Self {
            log_odds: 0.0,
            update_index: -1,
        }
    }
}

impl LogOddsCell {
    pub fn log_odds(&self) -> f64 {
        self.log_odds
    }

    pub fn set_log_odds(&mut self, value: f64) {
        self.log_odds = value;
    }

    pub fn update_index(&self) -> i64 {
        self.update_index
    }

    pub fn set_update_index(&mut self, index: i64) {
        self.update_index = index;
    }
}

impl Cell for LogOddsCell {
    fn value(&self) -> f64 {
        self.log_odds
    }

    fn is_occupied(&self) -> bool {
        self.log_odds > 0.0
    }

    fn is_free(&self) -> bool {
        self.log_odds < 0.0
    }

    fn reset(&mut self) {
        self.log_odds = 0.0;
        self.update_index = -1;
    }
}

/// Log-odds update deltas and probability conversion.
#[derive(Debug, Clone, Copy)]
pub struct LogOddsFunctions {
    log_odds_occupied: f64,
    log_odds_free: f64,
}

/// Occupied updates clamp here to avoid runaway values.
const LOG_ODDS_MAX: f64 = 50.0;

impl LogOddsFunctions {
    pub fn new() -> Self {
        let mut f = Self {
            log_odds_occupied: 0.0,
            log_odds_free: 0.0,
        };
        f.set_update_free_factor(0.4);
        f.set_update_occupied_factor(0.6);
        f
    }

    pub fn set_update_free_factor(&mut self, factor: f64) {
        self.log_odds_free = prob_to_log_odds(factor);
    }

    pub fn set_update_occupied_factor(&mut self, factor: f64) {
        self.log_odds_occupied = prob_to_log_odds(factor);
    }

    pub fn update_set_occupied(&self, cell: &mut LogOddsCell) {
        if cell.log_odds < LOG_ODDS_MAX {
            cell.log_odds += self.log_odds_occupied;
        }
    }

    pub fn update_set_free(&self, cell: &mut LogOddsCell) {
        cell.log_odds += self.log_odds_free;
    }

    /// Revert a free update applied earlier in the same scan.
    pub fn update_unset_free(&self, cell: &mut LogOddsCell) {
        cell.log_odds -= self.log_odds_free;
    }

    /// Occupancy probability represented by the cell.
    pub fn probability(&self, cell: &LogOddsCell) -> f64 {
        let odds = cell.log_odds.exp();
        odds / (odds + 1.0)
    }
}

impl Default for LogOddsFunctions {
    fn default() -> Self {
        Self::new()
    }
}

pub fn prob_to_log_odds(prob: f64) -> f64 {
    (prob / (1.0 - prob)).ln()
}
