//! The caller-declared static schema: the document class, its stores, its
//! annotation classes, and their field descriptors.
//!
//! All type knowledge is captured here at registration time. Each
//! [`FieldDef`] stores an erased setter built from a typed projection
//! function, so the decoder's hot path performs a single downcast and no
//! other dynamic type tests. Pointer fields derive their pointed-to class
//! from the projection's target type.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;

use crate::rt::StaticKlassRef;
use crate::{Ann, ByteSlice, Doc, Error, Ptr, Result, Slice, Store, META_KLASS};

/// How a declared field participates in decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldMode {
    /// Decoded into the declared field.
    #[default]
    Normal,
    /// Decoded into the declared field *and* preserved verbatim in the
    /// owner's lazy slab, so the original bytes survive re-emission.
    ReadOnly,
}

/// The wire form a field's value takes; drives the per-kind reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireShape {
    Bool,
    Int,
    F32,
    F64,
    Str,
    ByteSlice,
    Ptr,
    PtrSlice,
    PtrList,
}

/// A decoded field value on its way into a declared field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldValue {
    Bool(bool),
    Int(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(ByteSlice),
    Ptr(u32),
    Slice(u32, u32),
    PtrList(Vec<u32>),
}

type SetFn = Box<dyn Fn(&mut dyn Any, FieldValue) -> Result<()>>;

fn downcast<T: Any>(target: &mut dyn Any) -> Result<&mut T> {
    target.downcast_mut::<T>().ok_or_else(|| {
        Error::internal(format!(
            "field setter applied to an object that is not a `{}`",
            type_name::<T>()
        ))
    })
}

fn shape_error(value: &FieldValue) -> Error {
    Error::internal(format!("field value {value:?} does not match declared kind"))
}

macro_rules! int_ctor {
    ($(#[$doc:meta])* $ctor:ident, $int:ty) => {
        $(#[$doc])*
        pub fn $ctor<T: Any>(name: &str, get: fn(&mut T) -> &mut $int) -> Self {
            Self::new(
                name,
                WireShape::Int,
                Box::new(move |target, value| match value {
                    FieldValue::Int(v) => {
                        *get(downcast::<T>(target)?) = v as $int;
                        Ok(())
                    }
                    other => Err(shape_error(&other)),
                }),
            )
        }
    };
}

/// A static field descriptor: name, serial name, mode, structural flags, and
/// the erased setter that writes a decoded value into the declared field.
pub struct FieldDef {
    name: String,
    serial: String,
    mode: FieldMode,
    shape: WireShape,
    is_pointer: bool,
    is_self_pointer: bool,
    is_slice: bool,
    is_collection: bool,
    points_to: Option<TypeId>,
    points_to_name: Option<&'static str>,
    set: SetFn,
}

impl FieldDef {
    fn new(name: &str, shape: WireShape, set: SetFn) -> Self {
        Self {
            name: name.to_owned(),
            serial: name.to_owned(),
            mode: FieldMode::Normal,
            shape,
            is_pointer: false,
            is_self_pointer: false,
            is_slice: false,
            is_collection: false,
            points_to: None,
            points_to_name: None,
            set,
        }
    }

    /// Declares a boolean field.
    pub fn bool<T: Any>(name: &str, get: fn(&mut T) -> &mut bool) -> Self {
        Self::new(
            name,
            WireShape::Bool,
            Box::new(move |target, value| match value {
                FieldValue::Bool(v) => {
                    *get(downcast::<T>(target)?) = v;
                    Ok(())
                }
                other => Err(shape_error(&other)),
            }),
        )
    }

    int_ctor!(
        /// Declares an 8-bit integer field. Wider wire values are narrowed.
        int8,
        i8
    );
    int_ctor!(
        /// Declares a 16-bit integer field. Wider wire values are narrowed.
        int16,
        i16
    );
    int_ctor!(
        /// Declares a 32-bit integer field. Wider wire values are narrowed.
        int32,
        i32
    );
    int_ctor!(
        /// Declares a 64-bit integer field.
        int64,
        i64
    );

    /// Declares a character field. The wire carries an integer which is
    /// narrowed to a 16-bit code unit.
    pub fn char<T: Any>(name: &str, get: fn(&mut T) -> &mut char) -> Self {
        Self::new(
            name,
            WireShape::Int,
            Box::new(move |target, value| match value {
                FieldValue::Int(v) => {
                    let code = u32::from(v as u16);
                    *get(downcast::<T>(target)?) = char::from_u32(code).ok_or_else(|| {
                        Error::wire(format!("integer {v} is not a valid 16-bit character"))
                    })?;
                    Ok(())
                }
                other => Err(shape_error(&other)),
            }),
        )
    }

    /// Declares a 32-bit float field.
    pub fn float32<T: Any>(name: &str, get: fn(&mut T) -> &mut f32) -> Self {
        Self::new(
            name,
            WireShape::F32,
            Box::new(move |target, value| match value {
                FieldValue::F32(v) => {
                    *get(downcast::<T>(target)?) = v;
                    Ok(())
                }
                other => Err(shape_error(&other)),
            }),
        )
    }

    /// Declares a 64-bit float field.
    pub fn float64<T: Any>(name: &str, get: fn(&mut T) -> &mut f64) -> Self {
        Self::new(
            name,
            WireShape::F64,
            Box::new(move |target, value| match value {
                FieldValue::F64(v) => {
                    *get(downcast::<T>(target)?) = v;
                    Ok(())
                }
                other => Err(shape_error(&other)),
            }),
        )
    }

    /// Declares a string field.
    pub fn string<T: Any>(name: &str, get: fn(&mut T) -> &mut String) -> Self {
        Self::new(
            name,
            WireShape::Str,
            Box::new(move |target, value| match value {
                FieldValue::Str(v) => {
                    *get(downcast::<T>(target)?) = v;
                    Ok(())
                }
                other => Err(shape_error(&other)),
            }),
        )
    }

    /// Declares a byte-slice field: a `(start, stop)` range into the
    /// document's raw text.
    pub fn byte_slice<T: Any>(name: &str, get: fn(&mut T) -> &mut Option<ByteSlice>) -> Self {
        let mut def = Self::new(
            name,
            WireShape::ByteSlice,
            Box::new(move |target, value| match value {
                FieldValue::Bytes(v) => {
                    *get(downcast::<T>(target)?) = Some(v);
                    Ok(())
                }
                other => Err(shape_error(&other)),
            }),
        );
        def.is_slice = true;
        def
    }

    /// Declares a pointer field targeting annotations of type `P` in another
    /// store.
    pub fn ptr<T: Any, P: Ann>(name: &str, get: fn(&mut T) -> &mut Option<Ptr<P>>) -> Self {
        let mut def = Self::new(
            name,
            WireShape::Ptr,
            Box::new(move |target, value| match value {
                FieldValue::Ptr(index) => {
                    *get(downcast::<T>(target)?) = Some(Ptr::new(index));
                    Ok(())
                }
                other => Err(shape_error(&other)),
            }),
        );
        def.is_pointer = true;
        def.points_to = Some(TypeId::of::<P>());
        def.points_to_name = Some(type_name::<P>());
        def
    }

    /// Declares a self-pointer field: its indices resolve against the store
    /// the annotation itself lives in.
    pub fn self_ptr<T: Ann>(name: &str, get: fn(&mut T) -> &mut Option<Ptr<T>>) -> Self {
        let mut def = Self::new(
            name,
            WireShape::Ptr,
            Box::new(move |target, value| match value {
                FieldValue::Ptr(index) => {
                    *get(downcast::<T>(target)?) = Some(Ptr::new(index));
                    Ok(())
                }
                other => Err(shape_error(&other)),
            }),
        );
        def.is_self_pointer = true;
        def
    }

    /// Declares a pointer-slice field: a contiguous, inclusive-inclusive run
    /// of annotations of type `P` in another store.
    pub fn ptr_slice<T: Any, P: Ann>(name: &str, get: fn(&mut T) -> &mut Option<Slice<P>>) -> Self {
        let mut def = Self::new(
            name,
            WireShape::PtrSlice,
            Box::new(move |target, value| match value {
                FieldValue::Slice(start, stop) => {
                    *get(downcast::<T>(target)?) = Some(Slice::new(Ptr::new(start), Ptr::new(stop)));
                    Ok(())
                }
                other => Err(shape_error(&other)),
            }),
        );
        def.is_pointer = true;
        def.is_slice = true;
        def.points_to = Some(TypeId::of::<P>());
        def.points_to_name = Some(type_name::<P>());
        def
    }

    /// Declares a self-pointer-slice field.
    pub fn self_ptr_slice<T: Ann>(name: &str, get: fn(&mut T) -> &mut Option<Slice<T>>) -> Self {
        let mut def = Self::new(
            name,
            WireShape::PtrSlice,
            Box::new(move |target, value| match value {
                FieldValue::Slice(start, stop) => {
                    *get(downcast::<T>(target)?) = Some(Slice::new(Ptr::new(start), Ptr::new(stop)));
                    Ok(())
                }
                other => Err(shape_error(&other)),
            }),
        );
        def.is_self_pointer = true;
        def.is_slice = true;
        def
    }

    /// Declares a pointer-collection field: an ordered sequence of pointers
    /// to annotations of type `P` in another store.
    pub fn ptr_list<T: Any, P: Ann>(name: &str, get: fn(&mut T) -> &mut Vec<Ptr<P>>) -> Self {
        let mut def = Self::new(
            name,
            WireShape::PtrList,
            Box::new(move |target, value| match value {
                FieldValue::PtrList(indices) => {
                    *get(downcast::<T>(target)?) = indices.into_iter().map(Ptr::new).collect();
                    Ok(())
                }
                other => Err(shape_error(&other)),
            }),
        );
        def.is_pointer = true;
        def.is_collection = true;
        def.points_to = Some(TypeId::of::<P>());
        def.points_to_name = Some(type_name::<P>());
        def
    }

    /// Declares a self-pointer-collection field.
    pub fn self_ptr_list<T: Ann>(name: &str, get: fn(&mut T) -> &mut Vec<Ptr<T>>) -> Self {
        let mut def = Self::new(
            name,
            WireShape::PtrList,
            Box::new(move |target, value| match value {
                FieldValue::PtrList(indices) => {
                    *get(downcast::<T>(target)?) = indices.into_iter().map(Ptr::new).collect();
                    Ok(())
                }
                other => Err(shape_error(&other)),
            }),
        );
        def.is_self_pointer = true;
        def.is_collection = true;
        def
    }

    /// Overrides the name the field appears under on the wire.
    pub fn serial(mut self, serial: &str) -> Self {
        self.serial = serial.to_owned();
        self
    }

    /// Marks the field read-only: its value is materialized *and* its wire
    /// bytes are preserved in the owner's lazy slab.
    pub fn read_only(mut self) -> Self {
        self.mode = FieldMode::ReadOnly;
        self
    }

    /// Returns the field's in-memory name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name the field appears under on the wire.
    pub fn serial_name(&self) -> &str {
        &self.serial
    }

    /// Returns the field's mode.
    pub fn mode(&self) -> FieldMode {
        self.mode
    }

    /// Returns `true` for pointer and pointer-slice/collection fields
    /// targeting another store.
    pub fn is_pointer(&self) -> bool {
        self.is_pointer
    }

    /// Returns `true` for self-pointer fields.
    pub fn is_self_pointer(&self) -> bool {
        self.is_self_pointer
    }

    /// Returns `true` for byte-slice and pointer-slice fields.
    pub fn is_slice(&self) -> bool {
        self.is_slice
    }

    /// Returns `true` for pointer-collection fields.
    pub fn is_collection(&self) -> bool {
        self.is_collection
    }

    pub(crate) fn shape(&self) -> WireShape {
        self.shape
    }

    pub(crate) fn points_to(&self) -> Option<TypeId> {
        self.points_to
    }

    pub(crate) fn points_to_name(&self) -> Option<&'static str> {
        self.points_to_name
    }

    pub(crate) fn set_value(&self, target: &mut dyn Any, value: FieldValue) -> Result<()> {
        (self.set)(target, value)
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("serial", &self.serial)
            .field("mode", &self.mode)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// A static annotation-class descriptor: its serial name and ordered fields.
pub struct AnnKlass {
    serial: String,
    ty: TypeId,
    ty_name: &'static str,
    fields: Vec<FieldDef>,
}

impl AnnKlass {
    /// Creates a descriptor binding the annotation type `T` to `serial`, the
    /// name the class appears under on the wire.
    pub fn new<T: Ann + Default>(serial: &str) -> Self {
        Self {
            serial: serial.to_owned(),
            ty: TypeId::of::<T>(),
            ty_name: type_name::<T>(),
            fields: Vec::new(),
        }
    }

    /// Adds a field to the class.
    ///
    /// # Panics
    /// Panics if a field with the same serial name was already added.
    pub fn field(mut self, field: FieldDef) -> Self {
        assert!(
            !self.fields.iter().any(|f| f.serial == field.serial),
            "duplicate field serial name `{}` in class `{}`",
            field.serial,
            self.serial
        );
        self.fields.push(field);
        self
    }

    /// Returns the name the class appears under on the wire.
    pub fn serial_name(&self) -> &str {
        &self.serial
    }

    /// Returns the class's fields in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.ty
    }
}

impl fmt::Debug for AnnKlass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnKlass")
            .field("serial", &self.serial)
            .field("type", &self.ty_name)
            .field("fields", &self.fields)
            .finish()
    }
}

type ResizeFn = Box<dyn Fn(&mut dyn Any, usize) -> Result<()>>;
type ItemFn = Box<dyn for<'a> Fn(&'a mut dyn Any, usize) -> Result<&'a mut dyn Ann>>;

fn resize_fn<D: Doc, T: Ann + Default>(
    get: fn(&mut D) -> &mut Store<T>,
) -> impl Fn(&mut dyn Any, usize) -> Result<()> {
    move |doc: &mut dyn Any, len: usize| {
        get(downcast::<D>(doc)?).resize_default(len);
        Ok(())
    }
}

fn item_fn<D: Doc, T: Ann + Default>(
    get: fn(&mut D) -> &mut Store<T>,
) -> impl for<'a> Fn(&'a mut dyn Any, usize) -> Result<&'a mut dyn Ann> {
    move |doc: &mut dyn Any, index: usize| {
        let store = get(downcast::<D>(doc)?);
        let len = store.len();
        match store.get_mut(index) {
            Some(item) => Ok(item as &mut dyn Ann),
            None => Err(Error::bounds(format!(
                "annotation index {index} out of range for store of {len}"
            ))),
        }
    }
}

/// A static store descriptor: its serial name, stored class, and the erased
/// operations that size the store and reach its elements inside a document.
pub struct StoreDef {
    name: String,
    serial: String,
    stored: TypeId,
    stored_name: &'static str,
    resize: ResizeFn,
    item: ItemFn,
}

impl StoreDef {
    /// Creates a descriptor for a store of `T` reached through `get` on the
    /// document type `D`.
    pub fn new<D: Doc, T: Ann + Default>(name: &str, get: fn(&mut D) -> &mut Store<T>) -> Self {
        Self {
            name: name.to_owned(),
            serial: name.to_owned(),
            stored: TypeId::of::<T>(),
            stored_name: type_name::<T>(),
            resize: Box::new(resize_fn(get)),
            item: Box::new(item_fn(get)),
        }
    }

    /// Overrides the name the store appears under on the wire.
    pub fn serial(mut self, serial: &str) -> Self {
        self.serial = serial.to_owned();
        self
    }

    /// Returns the store's in-memory name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name the store appears under on the wire.
    pub fn serial_name(&self) -> &str {
        &self.serial
    }

    pub(crate) fn stored_type(&self) -> TypeId {
        self.stored
    }

    pub(crate) fn stored_type_name(&self) -> &'static str {
        self.stored_name
    }

    pub(crate) fn resize(&self, doc: &mut dyn Any, len: usize) -> Result<()> {
        (self.resize)(doc, len)
    }

    pub(crate) fn item_mut<'a>(
        &self,
        doc: &'a mut dyn Any,
        index: usize,
    ) -> Result<&'a mut dyn Ann> {
        (self.item)(doc, index)
    }
}

impl fmt::Debug for StoreDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreDef")
            .field("name", &self.name)
            .field("serial", &self.serial)
            .field("stored", &self.stored_name)
            .finish_non_exhaustive()
    }
}

/// The static schema for a document type `D`: its own fields, its annotation
/// classes, and its stores.
pub struct DocSchema<D> {
    fields: Vec<FieldDef>,
    klasses: Vec<AnnKlass>,
    stores: Vec<StoreDef>,
    _doc: PhantomData<fn() -> D>,
}

impl<D: Doc + Default> DocSchema<D> {
    /// Creates an empty schema for `D`.
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            klasses: Vec::new(),
            stores: Vec::new(),
            _doc: PhantomData,
        }
    }

    /// Adds a document-level field.
    ///
    /// # Panics
    /// Panics if a field with the same serial name was already added.
    pub fn field(&mut self, field: FieldDef) -> &mut Self {
        assert!(
            !self.fields.iter().any(|f| f.serial == field.serial),
            "duplicate document field serial name `{}`",
            field.serial
        );
        self.fields.push(field);
        self
    }

    /// Registers an annotation class.
    ///
    /// # Panics
    /// Panics if the serial name is `__meta__` (reserved for the document
    /// itself) or was already registered.
    pub fn klass(&mut self, klass: AnnKlass) -> &mut Self {
        assert!(
            klass.serial != META_KLASS,
            "`{META_KLASS}` is reserved for the document class"
        );
        assert!(
            !self.klasses.iter().any(|k| k.serial == klass.serial),
            "duplicate class serial name `{}`",
            klass.serial
        );
        self.klasses.push(klass);
        self
    }

    /// Registers a store of `T` reached through `get`.
    ///
    /// # Panics
    /// Panics if the serial name was already registered.
    pub fn store<T: Ann + Default>(
        &mut self,
        name: &str,
        get: fn(&mut D) -> &mut Store<T>,
    ) -> &mut Self {
        self.add_store(StoreDef::new::<D, T>(name, get))
    }

    /// Registers a store from a pre-built descriptor.
    ///
    /// # Panics
    /// Panics if the serial name was already registered.
    pub fn add_store(&mut self, store: StoreDef) -> &mut Self {
        assert!(
            !self.stores.iter().any(|s| s.serial == store.serial),
            "duplicate store serial name `{}`",
            store.serial
        );
        self.stores.push(store);
        self
    }

    /// Returns the document-level fields in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the registered annotation classes.
    pub fn klasses(&self) -> &[AnnKlass] {
        &self.klasses
    }

    /// Returns the registered stores.
    pub fn stores(&self) -> &[StoreDef] {
        &self.stores
    }

    pub(crate) fn klass_index(&self, serial: &str) -> Option<usize> {
        self.klasses.iter().position(|k| k.serial == serial)
    }

    pub(crate) fn store_index(&self, serial: &str) -> Option<usize> {
        self.stores.iter().position(|s| s.serial == serial)
    }

    pub(crate) fn klass_fields(&self, klass: StaticKlassRef) -> &[FieldDef] {
        match klass {
            StaticKlassRef::Doc => &self.fields,
            StaticKlassRef::Ann(index) => self.klasses[index].fields(),
        }
    }
}

impl<D: Doc + Default> Default for DocSchema<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for DocSchema<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocSchema")
            .field("fields", &self.fields)
            .field("klasses", &self.klasses)
            .field("stores", &self.stores)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{docrep_ann, docrep_doc, AnnState, DocState};

    #[derive(Debug, Default)]
    struct Token {
        state: AnnState,
        text: String,
        prev: Option<Ptr<Token>>,
    }
    docrep_ann!(Token { state });

    #[derive(Debug, Default)]
    struct TestDoc {
        state: DocState,
        tokens: Store<Token>,
        first: Option<Ptr<Token>>,
    }
    docrep_doc!(TestDoc { state });

    #[test]
    fn test_constructor_flags() {
        let text = FieldDef::string::<Token>("text", |t| &mut t.text);
        assert!(!text.is_pointer() && !text.is_slice() && !text.is_collection());

        let first = FieldDef::ptr::<TestDoc, Token>("first", |d| &mut d.first);
        assert!(first.is_pointer() && !first.is_self_pointer());

        let prev = FieldDef::self_ptr::<Token>("prev", |t| &mut t.prev);
        assert!(prev.is_self_pointer() && !prev.is_pointer());
    }

    #[test]
    fn test_serial_and_mode_modifiers() {
        let field = FieldDef::string::<Token>("text", |t| &mut t.text)
            .serial("surface")
            .read_only();
        assert_eq!(field.name(), "text");
        assert_eq!(field.serial_name(), "surface");
        assert_eq!(field.mode(), FieldMode::ReadOnly);
    }

    #[test]
    #[should_panic(expected = "duplicate field serial name")]
    fn test_duplicate_field_serial_panics() {
        let _ = AnnKlass::new::<Token>("Token")
            .field(FieldDef::string::<Token>("text", |t| &mut t.text))
            .field(FieldDef::string::<Token>("text", |t| &mut t.text));
    }

    #[test]
    #[should_panic(expected = "reserved for the document class")]
    fn test_meta_klass_reserved() {
        let mut schema = DocSchema::<TestDoc>::new();
        schema.klass(AnnKlass::new::<Token>(META_KLASS));
    }

    #[test]
    fn test_setter_narrows_to_declared_width() {
        #[derive(Debug, Default)]
        struct Sized8 {
            state: AnnState,
            small: i8,
        }
        docrep_ann!(Sized8 { state });

        let field = FieldDef::int8::<Sized8>("small", |t| &mut t.small);
        let mut target = Sized8::default();
        field
            .set_value(&mut target, FieldValue::Int(0x0102))
            .unwrap();
        assert_eq!(target.small, 2);
    }
}
