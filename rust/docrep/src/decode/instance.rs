//! The instance passes of a frame: the document instance and each store's
//! instance group.

use std::any::Any;
use std::io;

use crate::rt::{RtKlass, RtSchema};
use crate::schema::{DocSchema, FieldDef, FieldValue, WireShape};
use crate::store::LazySlab;
use crate::wire::WireReader;
use crate::{ByteSlice, Doc, Error, FieldMode, Result};

/// Reads a group's leading byte count, rejecting anything that could not be
/// held in a single in-memory buffer.
fn read_group_len<R: io::Read>(wire: &mut WireReader<R>, what: &str) -> Result<usize> {
    let nbytes = wire.read_i64(what)?;
    if nbytes < 0 {
        return Err(Error::bounds(format!(
            "{what} has negative byte count {nbytes}"
        )));
    }
    if nbytes as u64 > isize::MAX as u64 {
        return Err(Error::bounds(format!(
            "{what} of {nbytes} bytes exceeds the maximum buffer size"
        )));
    }
    Ok(nbytes as usize)
}

/// Reads the document instance. A document class with no static fields at
/// all short-circuits to a verbatim capture of the whole instance.
pub(super) fn read_doc_instance<D, R>(
    wire: &mut WireReader<R>,
    schema: &DocSchema<D>,
    rt: &RtSchema,
    doc: &mut D,
) -> Result<()>
where
    D: Doc + Default,
    R: io::Read,
{
    let nbytes = read_group_len(wire, "document instance header")?;
    if schema.fields().is_empty() {
        let bytes = wire.read_exact_bytes(nbytes, "lazy document instance")?;
        if !bytes.is_empty() {
            doc.doc_state_mut().lazy = Some(LazySlab::verbatim(bytes));
        }
        return Ok(());
    }

    let slab = read_instance(wire, schema.fields(), rt.doc_klass(), &mut *doc)?;
    if let Some(slab) = slab {
        doc.doc_state_mut().lazy = Some(slab);
    }
    Ok(())
}

/// Reads one store's instance group. A lazy store's group is captured
/// verbatim onto its runtime descriptor; a declared store's instances are
/// decoded in index order into the pre-sized annotations.
pub(super) fn read_store_group<D, R>(
    wire: &mut WireReader<R>,
    schema: &DocSchema<D>,
    rt: &mut RtSchema,
    store_idx: usize,
    doc: &mut D,
) -> Result<()>
where
    D: Doc + Default,
    R: io::Read,
{
    let nbytes = read_group_len(wire, "store group header")?;
    let store = &rt.stores[store_idx];
    let (klass_idx, nelem, static_idx) = (store.klass, store.nelem, store.static_idx);

    let Some(def_idx) = static_idx else {
        let bytes = wire.read_exact_bytes(nbytes, "lazy store group")?;
        rt.stores[store_idx].lazy_bytes = Some(bytes);
        return Ok(());
    };

    let def = &schema.stores()[def_idx];
    let klass = &rt.klasses[klass_idx];
    let statics = match klass.static_ref {
        Some(klass_ref) => schema.klass_fields(klass_ref),
        None => {
            return Err(Error::internal(format!(
                "declared store `{}` bound to a lazy class",
                def.serial_name()
            )))
        }
    };

    let ninstances = wire.read_array_header("store instance array")?;
    if ninstances != nelem {
        return Err(Error::wire(format!(
            "store `{}` group holds {ninstances} instances but was sized to {nelem}",
            def.serial_name()
        )));
    }
    for index in 0..ninstances {
        let ann = def.item_mut(&mut *doc, index)?;
        let slab = read_instance(wire, statics, klass, ann.as_any_mut())?;
        if let Some(slab) = slab {
            ann.ann_state_mut().lazy = Some(slab);
        }
    }
    Ok(())
}

/// Reads one instance map into `target`, returning the lazy slab of
/// preserved entries if any were captured.
///
/// The capture around each entry spans both the field-id key and the value,
/// so preserved entries keep the producer's exact byte encoding for both
/// tokens.
fn read_instance<R: io::Read>(
    wire: &mut WireReader<R>,
    statics: &[FieldDef],
    klass: &RtKlass,
    target: &mut dyn Any,
) -> Result<Option<LazySlab>> {
    let nentries = wire.read_map_header("instance map")?;
    let mut slab = LazySlab::default();

    for _ in 0..nentries {
        wire.begin_capture();
        let preserve = read_entry(wire, statics, klass, target);
        let captured = wire.end_capture();
        if preserve? {
            slab.push_entry(&captured);
        }
    }

    Ok((slab.nelem > 0).then_some(slab))
}

/// Reads one `(field id, value)` entry, mutating `target` for declared
/// fields. Returns `true` when the entry's bytes must be preserved on the
/// owner's lazy slab.
fn read_entry<R: io::Read>(
    wire: &mut WireReader<R>,
    statics: &[FieldDef],
    klass: &RtKlass,
    target: &mut dyn Any,
) -> Result<bool> {
    let field_id = wire.read_i32("field id")?;
    let field = usize::try_from(field_id)
        .ok()
        .and_then(|id| klass.fields.get(id))
        .ok_or_else(|| {
            Error::bounds(format!(
                "field id {field_id} out of range for class `{}` with {} fields",
                klass.serial,
                klass.fields.len()
            ))
        })?;

    match field.static_idx {
        // Unknown field: key and value stay buffered verbatim.
        None => {
            wire.skip_value("lazy field value")?;
            Ok(true)
        }
        Some(static_idx) => {
            let def = &statics[static_idx];
            let value = read_field_value(wire, def)?;
            def.set_value(target, value)?;
            Ok(def.mode() == FieldMode::ReadOnly)
        }
    }
}

fn read_index<R: io::Read>(wire: &mut WireReader<R>, what: &str) -> Result<u32> {
    let index = wire.read_i32(what)?;
    u32::try_from(index).map_err(|_| Error::wire(format!("negative {what}: {index}")))
}

fn read_pair_header<R: io::Read>(wire: &mut WireReader<R>, what: &str) -> Result<()> {
    let arity = wire.read_array_header(what)?;
    if arity != 2 {
        return Err(Error::wire(format!(
            "{what} must be a 2-tuple, found array of {arity}"
        )));
    }
    Ok(())
}

/// Reads one packed value according to the field's declared kind.
fn read_field_value<R: io::Read>(wire: &mut WireReader<R>, def: &FieldDef) -> Result<FieldValue> {
    Ok(match def.shape() {
        WireShape::Bool => FieldValue::Bool(wire.read_bool("boolean field")?),
        WireShape::Int => FieldValue::Int(wire.read_i64("integer field")?),
        WireShape::F32 => FieldValue::F32(wire.read_f32("float field")?),
        WireShape::F64 => FieldValue::F64(wire.read_f64("double field")?),
        WireShape::Str => FieldValue::Str(wire.read_string("string field")?),
        WireShape::ByteSlice => {
            read_pair_header(wire, "byte slice")?;
            let start = wire.read_i64("byte slice start")?;
            let len = wire.read_i64("byte slice length")?;
            let start = u64::try_from(start)
                .map_err(|_| Error::wire(format!("negative byte slice start {start}")))?;
            let len = u64::try_from(len)
                .map_err(|_| Error::wire(format!("negative byte slice length {len}")))?;
            let stop = start
                .checked_add(len)
                .ok_or_else(|| Error::wire("byte slice endpoint overflows"))?;
            FieldValue::Bytes(ByteSlice::new(start, stop))
        }
        WireShape::Ptr => FieldValue::Ptr(read_index(wire, "pointer index")?),
        WireShape::PtrSlice => {
            read_pair_header(wire, "pointer slice")?;
            let start = read_index(wire, "pointer slice start")?;
            let len = read_index(wire, "pointer slice length")?;
            if len == 0 {
                return Err(Error::wire("pointer slice of length zero"));
            }
            // Both endpoints are inclusive: the writer emits
            // len = stop - start + 1.
            let stop = start
                .checked_add(len - 1)
                .ok_or_else(|| Error::wire("pointer slice endpoint overflows"))?;
            FieldValue::Slice(start, stop)
        }
        WireShape::PtrList => {
            let n = wire.read_array_header("pointer collection")?;
            let mut indices = Vec::with_capacity(n);
            for _ in 0..n {
                indices.push(read_index(wire, "pointer collection index")?);
            }
            FieldValue::PtrList(indices)
        }
    })
}
