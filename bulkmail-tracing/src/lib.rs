//! `#[traced]` wraps a function in enter and exit trace events.
//!
//! ```ignore
//! #[traced(instrument(level = tracing::Level::DEBUG, skip(self)), timing(precision = "ms"))]
//! async fn insert(&self, attempt: &SendAttempt) -> Result<(), LedgerError> { ... }
//! ```
//!
//! - `instrument(...)` is forwarded to `#[tracing::instrument(...)]` as is.
//! - `timing` appends the elapsed time to the exit event, in milliseconds
//!   unless `precision = "s"` is given.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{ItemFn, LitStr, meta::ParseNestedMeta, parenthesized, parse_macro_input, parse_quote, token};

#[derive(Clone, Copy)]
enum Precision {
    Millis,
    Seconds,
}

impl Precision {
    fn from_lit(lit: &LitStr) -> syn::Result<Self> {
        match lit.value().as_str() {
            "ms" => Ok(Self::Millis),
            "s" => Ok(Self::Seconds),
            other => Err(syn::Error::new(
                lit.span(),
                format!("unsupported precision `{other}`, expected \"ms\" or \"s\""),
            )),
        }
    }

    fn render(self, elapsed: &TokenStream) -> TokenStream {
        match self {
            Self::Millis => quote!(format!("{} ms elapsed", #elapsed.as_millis())),
            Self::Seconds => quote!(format!("{} s elapsed", #elapsed.as_secs())),
        }
    }
}

#[derive(Default)]
struct Options {
    instrument: Option<TokenStream>,
    timing: Option<Precision>,
}

impl Options {
    fn parse(&mut self, meta: &ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("instrument") {
            if self.instrument.is_some() {
                return Err(meta.error("`instrument` given twice"));
            }

            let mut forwarded = TokenStream::new();
            if meta.input.peek(token::Paren) {
                let content;
                parenthesized!(content in meta.input);
                forwarded = content.parse()?;
            }
            self.instrument = Some(forwarded);
            return Ok(());
        }

        if meta.path.is_ident("timing") {
            if self.timing.is_some() {
                return Err(meta.error("`timing` given twice"));
            }

            let mut precision = Precision::Millis;
            if meta.input.peek(token::Paren) {
                meta.parse_nested_meta(|inner| {
                    if !inner.path.is_ident("precision") {
                        return Err(inner.error("expected `precision = \"ms\"` or `precision = \"s\"`"));
                    }
                    precision = Precision::from_lit(&inner.value()?.parse()?)?;
                    Ok(())
                })?;
            }
            self.timing = Some(precision);
            return Ok(());
        }

        Err(meta.error("expected `instrument` or `timing`"))
    }
}

/// Emits `OnEnter` and `OnExit` trace events around the attributed
/// function. The exit event fires from a drop guard, so early returns and
/// `?` are covered too.
#[proc_macro_attribute]
pub fn traced(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let mut options = Options::default();
    let parser = syn::meta::parser(|meta| options.parse(&meta));
    parse_macro_input!(args with parser);

    let mut item_fn = parse_macro_input!(item as ItemFn);

    if let Some(forwarded) = &options.instrument {
        item_fn
            .attrs
            .push(parse_quote!(#[tracing::instrument(#forwarded)]));
    }

    let name = item_fn.sig.ident.to_string();
    let on_exit = match options.timing {
        None => quote!(tracing::trace!("OnExit: {}", #name);),
        Some(precision) => {
            let elapsed = precision.render(&quote!(self.0.elapsed()));
            quote!(tracing::trace!("OnExit: {} ({})", #name, #elapsed);)
        }
    };

    let body = &item_fn.block;
    item_fn.block = parse_quote!({
        #[allow(dead_code)]
        struct __TracedGuard(std::time::Instant);

        impl std::ops::Drop for __TracedGuard {
            fn drop(&mut self) {
                #on_exit
            }
        }

        tracing::trace!("OnEnter: {}", #name);
        let __traced_guard = __TracedGuard(std::time::Instant::now());
        #body
    });

    quote!(#item_fn).into()
}
