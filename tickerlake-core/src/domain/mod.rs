//! Domain types shared by every Silver stage.

pub mod bar;
pub mod indicator_row;
pub mod split;
pub mod timeframe;

pub use bar::{AdjustedBar, AggregateBar, RawBar};
pub use indicator_row::IndicatorRow;
pub use split::{SplitError, SplitEvent};
pub use timeframe::Timeframe;
