pub use super::auto_content::Entity as AutoContent;
pub use super::backfill_checkpoint::Entity as BackfillCheckpoint;
pub use super::content::Entity as Content;
pub use super::content_tag::Entity as ContentTag;
pub use super::tag::Entity as Tag;
