//! Helper macros for wiring user types into the schema traits.

/// Implements [`Doc`](crate::Doc) for a document struct with an embedded
/// [`DocState`](crate::DocState) field.
///
/// ```
/// use docrep::DocState;
///
/// #[derive(Default)]
/// struct MyDoc {
///     state: DocState,
///     title: String,
/// }
/// docrep::docrep_doc!(MyDoc { state });
/// ```
#[macro_export]
macro_rules! docrep_doc {
    ($ty:ty { $state:ident }) => {
        impl $crate::Doc for $ty {
            fn doc_state(&self) -> &$crate::DocState {
                &self.$state
            }

            fn doc_state_mut(&mut self) -> &mut $crate::DocState {
                &mut self.$state
            }
        }
    };
}

/// Implements [`Ann`](crate::Ann) for an annotation struct with an embedded
/// [`AnnState`](crate::AnnState) field.
///
/// ```
/// use docrep::AnnState;
///
/// #[derive(Default)]
/// struct Token {
///     state: AnnState,
///     text: String,
/// }
/// docrep::docrep_ann!(Token { state });
/// ```
#[macro_export]
macro_rules! docrep_ann {
    ($ty:ty { $state:ident }) => {
        impl $crate::Ann for $ty {
            fn ann_state(&self) -> &$crate::AnnState {
                &self.$state
            }

            fn ann_state_mut(&mut self) -> &mut $crate::AnnState {
                &mut self.$state
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
}
