//! Content service core: the tag-filtered content query engine and the
//! migration machinery moving tag storage from the denormalized array
//! columns to the normalized `content_tag` relation.

pub mod modules;
