pub mod prelude;

pub mod auto_content;
pub mod backfill_checkpoint;
pub mod content;
pub mod content_tag;
pub mod tag;
