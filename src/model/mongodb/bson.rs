use mongodb::bson::{doc, Document};

/// A filter matching the document whose `_id` is the given integer ID.
pub fn u32_id_filter(id: u32) -> Document {
    doc! {
        "_id": id,
    }
}
