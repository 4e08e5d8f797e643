//! The per-frame runtime schema: the stream's embedded classes and stores
//! reconciled against the static declarations.
//!
//! Every docrep frame carries its own schema, so a fresh `RtSchema` is built
//! for each document and handed to it once the frame is fully decoded. An
//! entity with no static counterpart is *lazy*: its bytes are preserved
//! verbatim and never structurally interpreted. All cross-references are
//! plain indices: klass ids and store ids are positional in their blocks,
//! and pointer fields record their target store by index after back-fill.

/// Which static declaration backs a runtime class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StaticKlassRef {
    /// The document class itself (`__meta__` on the wire).
    Doc,
    /// The annotation class at this index in the static schema.
    Ann(usize),
}

/// A field as declared by the stream, possibly bound to a static field.
#[derive(Debug)]
pub struct RtField {
    pub(crate) serial: String,
    pub(crate) is_pointer: bool,
    pub(crate) is_self_pointer: bool,
    pub(crate) is_slice: bool,
    pub(crate) is_collection: bool,
    /// Index into the owning klass's static field list, when matched.
    pub(crate) static_idx: Option<usize>,
    /// Target store id, filled by pointer back-fill.
    pub(crate) target_store: Option<usize>,
}

impl RtField {
    /// Returns the name the field appears under on the wire.
    pub fn serial_name(&self) -> &str {
        &self.serial
    }

    /// Returns `true` if the field has no static counterpart. Fields of a
    /// lazy class are always lazy.
    pub fn is_lazy(&self) -> bool {
        self.static_idx.is_none()
    }

    /// Returns `true` if the stream declared the field a pointer.
    pub fn is_pointer(&self) -> bool {
        self.is_pointer
    }

    /// Returns `true` if the stream declared the field a self-pointer.
    pub fn is_self_pointer(&self) -> bool {
        self.is_self_pointer
    }

    /// Returns `true` if the stream declared the field a slice.
    pub fn is_slice(&self) -> bool {
        self.is_slice
    }

    /// Returns `true` if the stream declared the field a collection.
    pub fn is_collection(&self) -> bool {
        self.is_collection
    }

    /// Returns the id of the store this pointer field targets, once bound.
    pub fn target_store(&self) -> Option<usize> {
        self.target_store
    }
}

/// A class as declared by the stream, possibly bound to a static class.
#[derive(Debug)]
pub struct RtKlass {
    pub(crate) klass_id: u32,
    pub(crate) serial: String,
    pub(crate) fields: Vec<RtField>,
    pub(crate) static_ref: Option<StaticKlassRef>,
}

impl RtKlass {
    /// Returns the class's positional id in the frame's classes block.
    pub fn klass_id(&self) -> u32 {
        self.klass_id
    }

    /// Returns the name the class appears under on the wire.
    pub fn serial_name(&self) -> &str {
        &self.serial
    }

    /// Returns `true` if the class has no static counterpart; no instances
    /// are materialized for it.
    pub fn is_lazy(&self) -> bool {
        self.static_ref.is_none()
    }

    /// Returns the class's fields in wire order, indexed by field id.
    pub fn fields(&self) -> &[RtField] {
        &self.fields
    }
}

/// A store as declared by the stream, possibly bound to a static store.
#[derive(Debug)]
pub struct RtStore {
    pub(crate) store_id: u32,
    pub(crate) serial: String,
    pub(crate) klass: usize,
    pub(crate) nelem: usize,
    pub(crate) static_idx: Option<usize>,
    pub(crate) lazy_bytes: Option<Vec<u8>>,
}

impl RtStore {
    /// Returns the store's positional id in the frame's stores block.
    pub fn store_id(&self) -> u32 {
        self.store_id
    }

    /// Returns the name the store appears under on the wire.
    pub fn serial_name(&self) -> &str {
        &self.serial
    }

    /// Returns the id of the class the store's elements belong to.
    pub fn klass_id(&self) -> usize {
        self.klass
    }

    /// Returns the number of annotations the stream sized the store to.
    pub fn len(&self) -> usize {
        self.nelem
    }

    /// Returns `true` if the store was sized to zero annotations.
    pub fn is_empty(&self) -> bool {
        self.nelem == 0
    }

    /// Returns `true` if the store has no static counterpart; its instance
    /// group is preserved verbatim instead of materialized.
    pub fn is_lazy(&self) -> bool {
        self.static_idx.is_none()
    }

    /// Returns the verbatim bytes of a lazy store's instance group.
    pub fn lazy_bytes(&self) -> Option<&[u8]> {
        self.lazy_bytes.as_deref()
    }
}

/// The reconciled schema a document was decoded with.
#[derive(Debug)]
pub struct RtSchema {
    pub(crate) klasses: Vec<RtKlass>,
    pub(crate) stores: Vec<RtStore>,
    pub(crate) doc_klass: usize,
}

impl RtSchema {
    /// Returns the frame's classes in klass-id order.
    pub fn klasses(&self) -> &[RtKlass] {
        &self.klasses
    }

    /// Returns the frame's stores in store-id order.
    pub fn stores(&self) -> &[RtStore] {
        &self.stores
    }

    /// Returns the class designating the document itself.
    pub fn doc_klass(&self) -> &RtKlass {
        &self.klasses[self.doc_klass]
    }
}
