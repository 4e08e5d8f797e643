//! Decoding docrep streams, one self-describing frame per document.

mod header;
mod instance;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use crate::schema::DocSchema;
use crate::wire::WireReader;
use crate::{Doc, Error, Result, DOCREP_VERSION};

/// Reads documents of type `D` from a docrep byte stream.
///
/// Each call to [`read_next`](Self::read_next) consumes one frame: the
/// embedded schema is reconciled against the static `schema`, a fresh `D` is
/// materialized, and everything the schema does not declare is preserved on
/// the document as verbatim bytes. Frames are independent; a heterogeneous
/// stream whose frames carry different embedded schemas decodes fine.
///
/// After any error the reader's position in the stream is unspecified and
/// the reader must be discarded.
pub struct Reader<'a, D, R> {
    schema: &'a DocSchema<D>,
    wire: WireReader<R>,
}

impl<'a, D, R> Reader<'a, D, R>
where
    D: Doc + Default,
    R: io::Read,
{
    /// Creates a new docrep [`Reader`] consuming from `reader`.
    pub fn new(reader: R, schema: &'a DocSchema<D>) -> Self {
        Self {
            schema,
            wire: WireReader::new(reader),
        }
    }

    /// Reads the next document, or `None` once the stream is exhausted.
    ///
    /// End of stream is only clean at a frame boundary; running out of bytes
    /// anywhere inside a frame is an error. Once `None` has been returned,
    /// further calls keep returning `None`.
    ///
    /// # Errors
    /// Returns an error on malformed wire data, on a schema disagreement
    /// between the stream and the static declarations, or if the underlying
    /// reader fails.
    pub fn read_next(&mut self) -> Result<Option<D>> {
        let Some(version) = self.wire.read_frame_version()? else {
            return Ok(None);
        };
        if version != DOCREP_VERSION {
            return Err(Error::wire(format!(
                "unsupported wire version {version}, expected {DOCREP_VERSION}"
            )));
        }

        let mut doc = D::default();
        let (mut rt, pending) = header::read_klasses(&mut self.wire, self.schema)?;
        header::read_stores(&mut self.wire, self.schema, &mut rt, &mut doc)?;
        header::bind_pointers(&mut rt, pending, self.schema)?;

        instance::read_doc_instance(&mut self.wire, self.schema, &rt, &mut doc)?;
        for store_idx in 0..rt.stores.len() {
            instance::read_store_group(&mut self.wire, self.schema, &mut rt, store_idx, &mut doc)?;
        }

        doc.doc_state_mut().rt = Some(rt);
        Ok(Some(doc))
    }

    /// Converts the reader into an iterator over its remaining documents.
    /// The iterator ends after the first error.
    pub fn docs(self) -> Docs<'a, D, R> {
        Docs {
            reader: self,
            done: false,
        }
    }

    /// Returns a reference to the inner reader.
    pub fn get_ref(&self) -> &R {
        self.wire.get_ref()
    }

    /// Returns a mutable reference to the inner reader.
    pub fn get_mut(&mut self) -> &mut R {
        self.wire.get_mut()
    }

    /// Consumes the decoder and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.wire.into_inner()
    }
}

impl<'a, D, R> Reader<'a, D, zstd::stream::Decoder<'static, BufReader<R>>>
where
    D: Doc + Default,
    R: io::Read,
{
    /// Creates a new docrep [`Reader`] from Zstandard-compressed `reader`.
    ///
    /// # Errors
    /// Returns an error if the zstd decoder cannot be created.
    pub fn with_zstd(reader: R, schema: &'a DocSchema<D>) -> Result<Self> {
        Ok(Self::new(
            zstd::stream::Decoder::new(reader)
                .map_err(|e| Error::io(e, "creating zstd decoder"))?,
            schema,
        ))
    }
}

impl<'a, D, R> Reader<'a, D, zstd::stream::Decoder<'static, R>>
where
    D: Doc + Default,
    R: io::BufRead,
{
    /// Creates a new docrep [`Reader`] from Zstandard-compressed buffered
    /// `reader`.
    ///
    /// # Errors
    /// Returns an error if the zstd decoder cannot be created.
    pub fn with_zstd_buffer(reader: R, schema: &'a DocSchema<D>) -> Result<Self> {
        Ok(Self::new(
            zstd::stream::Decoder::with_buffer(reader)
                .map_err(|e| Error::io(e, "creating zstd decoder"))?,
            schema,
        ))
    }
}

impl<'a, D: Doc + Default> Reader<'a, D, BufReader<File>> {
    /// Creates a docrep [`Reader`] from the file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn from_file(path: impl AsRef<Path>, schema: &'a DocSchema<D>) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::io(
                e,
                format!(
                    "opening docrep file at path '{}'",
                    path.as_ref().display()
                ),
            )
        })?;
        Ok(Self::new(BufReader::new(file), schema))
    }
}

impl<'a, D: Doc + Default> Reader<'a, D, zstd::stream::Decoder<'static, BufReader<File>>> {
    /// Creates a docrep [`Reader`] from the Zstandard-compressed file at
    /// `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the zstd decoder
    /// cannot be created.
    pub fn from_zstd_file(path: impl AsRef<Path>, schema: &'a DocSchema<D>) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::io(
                e,
                format!(
                    "opening Zstandard-compressed docrep file at path '{}'",
                    path.as_ref().display()
                ),
            )
        })?;
        Self::with_zstd(file, schema)
    }
}

/// An iterator over the documents of a [`Reader`], fused after the first
/// error or the end of the stream.
pub struct Docs<'a, D, R> {
    reader: Reader<'a, D, R>,
    done: bool,
}

impl<'a, D, R> Iterator for Docs<'a, D, R>
where
    D: Doc + Default,
    R: io::Read,
{
    type Item = Result<D>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_next() {
            Ok(Some(doc)) => Some(Ok(doc)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
