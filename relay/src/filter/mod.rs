//! Filters transform or suppress events between extraction and apply.

mod base;
mod seqno_range;

pub use base::Filter;
pub use seqno_range::SeqnoRangeFilter;
