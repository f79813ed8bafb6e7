//! Tagged Record Extensions: wire framing, the declarative schema tree,
//! and the schema interpreter that turns raw TRE bytes into ordered
//! metadata.

pub mod interpret;
pub mod record;
pub mod schema;

pub use interpret::{decode_tre, TreDecoded};
pub use record::{
    find_tre, read_record, TreIter, TreRecord, TRE_LEN_DIGITS, TRE_PREFIX_LEN, TRE_TAG_LEN,
};
pub use schema::{
    shared_registry, Condition, LengthSpec, LoopCount, LoopFormula, SchemaNode, TreSchema,
    TreSchemaRegistry,
};
