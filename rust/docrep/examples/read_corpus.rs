//! Reads a docrep corpus of tokenized documents and prints each document's
//! tokens with their raw-text spans.
//!
//! Usage: `cargo run --example read_corpus -- corpus.docrep`

use docrep::{decode::Reader, AnnKlass, AnnState, ByteSlice, DocSchema, DocState, FieldDef, Store};

#[derive(Debug, Default)]
struct Token {
    state: AnnState,
    text: String,
    span: Option<ByteSlice>,
}
docrep::docrep_ann!(Token { state });

#[derive(Debug, Default)]
struct Document {
    state: DocState,
    name: String,
    tokens: Store<Token>,
}
docrep::docrep_doc!(Document { state });

fn main() -> Result<(), docrep::Error> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "corpus.docrep".to_owned());

    let mut schema = DocSchema::<Document>::new();
    schema.field(FieldDef::string::<Document>("name", |d| &mut d.name));
    schema.klass(
        AnnKlass::new::<Token>("Token")
            .field(FieldDef::string::<Token>("text", |t| &mut t.text))
            .field(FieldDef::byte_slice::<Token>("span", |t| &mut t.span)),
    );
    schema.store::<Token>("tokens", |d| &mut d.tokens);

    let reader = Reader::from_file(&path, &schema)?;
    for doc in reader.docs() {
        let doc = doc?;
        println!("{} ({} tokens)", doc.name, doc.tokens.len());
        for token in &doc.tokens {
            match token.span {
                Some(span) => println!("  {}..{}\t{}", span.start, span.stop, token.text),
                None => println!("  -\t{}", token.text),
            }
        }
    }
    Ok(())
}
