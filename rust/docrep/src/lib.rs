//! A streaming reader for docrep, a self-describing binary document format
//! for annotated text corpora.
//!
//! Each frame of a docrep stream carries its own schema: the classes, stores,
//! and fields it was written with. The reader reconciles that embedded schema
//! against the caller's static declarations (a [`DocSchema`]), materializes
//! typed document and annotation instances, and preserves everything the
//! caller did not declare (whole classes, whole stores, or single fields) as
//! verbatim byte slabs so a writer can re-emit them untouched.
//!
//! ```no_run
//! use docrep::{decode::Reader, AnnState, DocSchema, DocState, FieldDef, Store};
//!
//! #[derive(Default)]
//! struct Token {
//!     state: AnnState,
//!     text: String,
//! }
//! docrep::docrep_ann!(Token { state });
//!
//! #[derive(Default)]
//! struct Doc {
//!     state: DocState,
//!     tokens: Store<Token>,
//! }
//! docrep::docrep_doc!(Doc { state });
//!
//! # fn main() -> docrep::Result<()> {
//! let mut schema = DocSchema::<Doc>::new();
//! schema.klass(
//!     docrep::AnnKlass::new::<Token>("Token")
//!         .field(FieldDef::string::<Token>("text", |t| &mut t.text)),
//! );
//! schema.store::<Token>("tokens", |d| &mut d.tokens);
//!
//! let mut reader = Reader::from_file("corpus.docrep", &schema)?;
//! while let Some(doc) = reader.read_next()? {
//!     for token in &doc.tokens {
//!         println!("{}", token.text);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::missing_errors_doc)]

pub mod decode;
pub mod error;
pub mod macros;
pub mod rt;
pub mod schema;
pub mod slice;
pub mod store;
pub mod wire;

pub use crate::{
    decode::Reader,
    error::{Error, Result},
    schema::{AnnKlass, DocSchema, FieldDef, FieldMode, StoreDef},
    slice::{ByteSlice, Ptr, Slice},
    store::{Ann, AnnState, Doc, DocState, LazySlab, Store},
};

/// The current version of the docrep wire format. It is the sole version this
/// reader accepts.
pub const DOCREP_VERSION: u8 = 3;

/// The serial name under which the document class itself appears in a
/// frame's classes block.
pub const META_KLASS: &str = "__meta__";
