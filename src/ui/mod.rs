pub mod icons;
pub mod progress;
pub mod summary;

pub use progress::RunProgress;
pub use summary::{SummaryRow, print_summary, summary_rows};
