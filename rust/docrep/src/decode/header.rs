//! The header passes of a frame: classes block, stores block, and pointer
//! back-fill.

use std::io;

use num_enum::TryFromPrimitive;

use crate::rt::{RtField, RtKlass, RtSchema, RtStore, StaticKlassRef};
use crate::schema::{DocSchema, FieldDef};
use crate::wire::WireReader;
use crate::{Doc, Error, Result, META_KLASS};

/// Keys of the field map in the classes block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
enum FieldKey {
    Name = 0,
    PointerTo = 1,
    IsSlice = 2,
    IsSelfPointer = 3,
    IsCollection = 4,
}

/// A field as it appears on the wire, before reconciliation.
struct RawField {
    serial: String,
    pointer_to: Option<u32>,
    is_slice: bool,
    is_self_pointer: bool,
    is_collection: bool,
}

/// A pointer field waiting for its target store to be known.
pub(super) struct PendingPointer {
    klass: usize,
    field: usize,
    store_id: u32,
}

/// Reads the classes block and reconciles each class and field against the
/// static schema.
pub(super) fn read_klasses<D, R>(
    wire: &mut WireReader<R>,
    schema: &DocSchema<D>,
) -> Result<(RtSchema, Vec<PendingPointer>)>
where
    D: Doc + Default,
    R: io::Read,
{
    let nklasses = wire.read_array_header("classes block")?;
    let mut klasses = Vec::with_capacity(nklasses);
    let mut pending = Vec::new();
    let mut doc_klass = None;

    for klass_id in 0..nklasses {
        let arity = wire.read_array_header("class entry")?;
        if arity != 2 {
            return Err(Error::wire(format!(
                "class entry must be a 2-tuple, found array of {arity}"
            )));
        }
        let serial = wire.read_string("class name")?;
        let static_ref = if serial == META_KLASS {
            if doc_klass.is_some() {
                return Err(Error::wire(format!(
                    "classes block declares `{META_KLASS}` more than once"
                )));
            }
            doc_klass = Some(klass_id);
            Some(StaticKlassRef::Doc)
        } else {
            schema.klass_index(&serial).map(StaticKlassRef::Ann)
        };

        let nfields = wire.read_array_header("class field list")?;
        let mut fields = Vec::with_capacity(nfields);
        for field_id in 0..nfields {
            let raw = read_raw_field(wire)?;
            let static_idx = match static_ref {
                None => None,
                Some(klass_ref) => {
                    let statics = schema.klass_fields(klass_ref);
                    match statics.iter().position(|f| f.serial_name() == raw.serial) {
                        Some(idx) => {
                            check_flags(&statics[idx], &raw, &serial)?;
                            Some(idx)
                        }
                        None => None,
                    }
                }
            };
            if let Some(store_id) = raw.pointer_to {
                pending.push(PendingPointer {
                    klass: klass_id,
                    field: field_id,
                    store_id,
                });
            }
            fields.push(RtField {
                serial: raw.serial,
                is_pointer: raw.pointer_to.is_some(),
                is_self_pointer: raw.is_self_pointer,
                is_slice: raw.is_slice,
                is_collection: raw.is_collection,
                static_idx,
                target_store: None,
            });
        }

        klasses.push(RtKlass {
            klass_id: klass_id as u32,
            serial,
            fields,
            static_ref,
        });
    }

    let doc_klass = doc_klass.ok_or(Error::MissingMeta)?;
    Ok((
        RtSchema {
            klasses,
            stores: Vec::new(),
            doc_klass,
        },
        pending,
    ))
}

fn read_raw_field<R: io::Read>(wire: &mut WireReader<R>) -> Result<RawField> {
    let nkeys = wire.read_map_header("field map")?;
    let mut serial = None;
    let mut pointer_to = None;
    let mut is_slice = false;
    let mut is_self_pointer = false;
    let mut is_collection = false;

    for _ in 0..nkeys {
        let key = wire.read_u8("field map key")?;
        let key = FieldKey::try_from(key)
            .map_err(|_| Error::wire(format!("unexpected field map key {key}")))?;
        match key {
            FieldKey::Name => serial = Some(wire.read_string("field name")?),
            FieldKey::PointerTo => {
                let store_id = wire.read_i32("pointer target store id")?;
                pointer_to = Some(u32::try_from(store_id).map_err(|_| {
                    Error::bounds(format!("negative pointer target store id {store_id}"))
                })?);
            }
            FieldKey::IsSlice => {
                wire.read_nil("slice flag")?;
                is_slice = true;
            }
            FieldKey::IsSelfPointer => {
                wire.read_nil("self-pointer flag")?;
                is_self_pointer = true;
            }
            FieldKey::IsCollection => {
                wire.read_nil("collection flag")?;
                is_collection = true;
            }
        }
    }

    Ok(RawField {
        serial: serial.ok_or_else(|| Error::wire("field map is missing the NAME key"))?,
        pointer_to,
        is_slice,
        is_self_pointer,
        is_collection,
    })
}

/// Structural sanity check between a stream field and its static
/// counterpart. Both directions matter: a static pointer whose stream field
/// carries no pointer key is as wrong as the reverse.
fn check_flags(declared: &FieldDef, raw: &RawField, klass_serial: &str) -> Result<()> {
    let stream = (
        raw.pointer_to.is_some(),
        raw.is_self_pointer,
        raw.is_slice,
        raw.is_collection,
    );
    let wanted = (
        declared.is_pointer(),
        declared.is_self_pointer(),
        declared.is_slice(),
        declared.is_collection(),
    );
    if stream != wanted {
        return Err(Error::schema_mismatch(format!(
            "field `{}` of class `{klass_serial}`: stream flags \
             (pointer {}, self-pointer {}, slice {}, collection {}) disagree with the declared \
             (pointer {}, self-pointer {}, slice {}, collection {})",
            raw.serial, stream.0, stream.1, stream.2, stream.3, wanted.0, wanted.1, wanted.2,
            wanted.3,
        )));
    }
    Ok(())
}

/// Reads the stores block, sizing each statically-declared store inside the
/// document as it goes.
pub(super) fn read_stores<D, R>(
    wire: &mut WireReader<R>,
    schema: &DocSchema<D>,
    rt: &mut RtSchema,
    doc: &mut D,
) -> Result<()>
where
    D: Doc + Default,
    R: io::Read,
{
    let nstores = wire.read_array_header("stores block")?;
    for store_id in 0..nstores {
        let arity = wire.read_array_header("store entry")?;
        if arity != 3 {
            return Err(Error::wire(format!(
                "store entry must be a 3-tuple, found array of {arity}"
            )));
        }
        let serial = wire.read_string("store name")?;
        let klass_id = wire.read_i32("store klass id")?;
        let klass_id = usize::try_from(klass_id)
            .ok()
            .filter(|id| *id < rt.klasses.len())
            .ok_or_else(|| {
                Error::bounds(format!(
                    "store `{serial}` names klass id {klass_id} but the frame declares {} classes",
                    rt.klasses.len()
                ))
            })?;
        let nelem = wire.read_i32("store element count")?;
        let nelem = usize::try_from(nelem)
            .map_err(|_| Error::bounds(format!("store `{serial}` has negative size {nelem}")))?;

        let static_idx = schema.store_index(&serial);
        if let Some(idx) = static_idx {
            let def = &schema.stores()[idx];
            let klass = &rt.klasses[klass_id];
            let matches = match klass.static_ref {
                Some(StaticKlassRef::Ann(kidx)) => {
                    schema.klasses()[kidx].type_id() == def.stored_type()
                }
                _ => false,
            };
            if !matches {
                return Err(Error::schema_mismatch(format!(
                    "store `{serial}` holds wire class `{}` but was declared to store `{}`",
                    klass.serial,
                    def.stored_type_name()
                )));
            }
            def.resize(&mut *doc, nelem)?;
        }

        rt.stores.push(RtStore {
            store_id: store_id as u32,
            serial,
            klass: klass_id,
            nelem,
            static_idx,
            lazy_bytes: None,
        });
    }
    Ok(())
}

/// Binds every recorded pointer field to its target store, now that all
/// stores are known.
pub(super) fn bind_pointers<D: Doc + Default>(
    rt: &mut RtSchema,
    pending: Vec<PendingPointer>,
    schema: &DocSchema<D>,
) -> Result<()> {
    for p in pending {
        let target = p.store_id as usize;
        let klass = &rt.klasses[p.klass];
        let field = &klass.fields[p.field];
        if target >= rt.stores.len() {
            return Err(Error::bounds(format!(
                "pointer field `{}` of class `{}` targets store id {} but the frame declares \
                 {} stores",
                field.serial,
                klass.serial,
                p.store_id,
                rt.stores.len()
            )));
        }
        if let (Some(klass_ref), Some(static_idx)) = (klass.static_ref, field.static_idx) {
            let def = &schema.klass_fields(klass_ref)[static_idx];
            let store = &rt.stores[target];
            let stored = store
                .static_idx
                .map(|idx| schema.stores()[idx].stored_type());
            if stored.is_none() || stored != def.points_to() {
                return Err(Error::schema_mismatch(format!(
                    "pointer field `{}` of class `{}` is declared to target `{}` but store \
                     `{}` does not hold that class",
                    field.serial,
                    klass.serial,
                    def.points_to_name().unwrap_or("<not a pointer>"),
                    store.serial
                )));
            }
        }
        rt.klasses[p.klass].fields[p.field].target_store = Some(target);
    }
    Ok(())
}
