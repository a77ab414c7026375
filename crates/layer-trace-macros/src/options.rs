//! Parsing of the `#[trace(...)]` argument list

use proc_macro2::TokenStream;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::{Error, Expr, ExprArray, ExprLit, Lit, LitBool, LitStr, Meta, Path, Result, Token};

const KNOWN_KEYS: &str = "disable, perf, mem_watch, log_input, sink";

/// Options accepted by `#[trace]`
#[derive(Debug, Clone)]
pub struct TraceOptions {
    /// Method names left untouched
    pub disable: Vec<LitStr>,
    /// Measure execution time
    pub perf: bool,
    /// Measure resident memory delta
    pub mem_watch: bool,
    /// Emit the pre-call argument record
    pub log_input: bool,
    /// Pretty-print and highlight the argument record
    pub beautify: bool,
    /// Function returning the sink, `fn() -> Arc<dyn LogSink>`
    pub sink: Option<Path>,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            disable: Vec::new(),
            perf: false,
            mem_watch: false,
            log_input: true,
            beautify: false,
            sink: None,
        }
    }
}

impl TraceOptions {
    /// Parse the tokens between the attribute's parentheses
    pub fn parse(attr: TokenStream) -> Result<Self> {
        let metas = Punctuated::<Meta, Token![,]>::parse_terminated.parse2(attr)?;
        let mut options = Self::default();

        for meta in metas {
            let key = meta_key(&meta)?;
            match key.as_str() {
                "disable" => options.disable.extend(parse_names(&meta)?),
                "perf" => options.perf = parse_flag(&meta)?,
                "mem_watch" => options.mem_watch = parse_flag(&meta)?,
                "log_input" => options.parse_log_input(&meta)?,
                "sink" => options.sink = Some(parse_path(&meta)?),
                other => {
                    return Err(Error::new_spanned(
                        meta.path(),
                        format!("unknown trace option `{other}`, expected one of: {KNOWN_KEYS}"),
                    ))
                }
            }
        }

        Ok(options)
    }

    /// Whether `name` is listed in `disable`
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disable.iter().any(|lit| lit.value() == name)
    }

    fn parse_log_input(&mut self, meta: &Meta) -> Result<()> {
        match meta {
            Meta::List(list) => {
                let nested = list.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
                for inner in nested {
                    match meta_key(&inner)?.as_str() {
                        "enabled" => self.log_input = parse_flag(&inner)?,
                        "beautify" => self.beautify = parse_flag(&inner)?,
                        other => {
                            return Err(Error::new_spanned(
                                inner.path(),
                                format!(
                                    "unknown log_input option `{other}`, expected `enabled` or `beautify`"
                                ),
                            ))
                        }
                    }
                }
                Ok(())
            }
            _ => {
                self.log_input = parse_flag(meta)?;
                Ok(())
            }
        }
    }
}

fn meta_key(meta: &Meta) -> Result<String> {
    meta.path()
        .get_ident()
        .map(ToString::to_string)
        .ok_or_else(|| Error::new_spanned(meta.path(), "expected a plain option name"))
}

/// `key` alone means true; `key = <bool>` is explicit
fn parse_flag(meta: &Meta) -> Result<bool> {
    match meta {
        Meta::Path(_) => Ok(true),
        Meta::NameValue(nv) => match &nv.value {
            Expr::Lit(ExprLit {
                lit: Lit::Bool(LitBool { value, .. }),
                ..
            }) => Ok(*value),
            other => Err(Error::new_spanned(other, "expected `true` or `false`")),
        },
        Meta::List(list) => Err(Error::new_spanned(
            list,
            "expected `key` or `key = true|false`",
        )),
    }
}

/// `disable = ["a", "b"]`
fn parse_names(meta: &Meta) -> Result<Vec<LitStr>> {
    let Meta::NameValue(nv) = meta else {
        return Err(Error::new_spanned(meta, r#"expected `disable = ["name", ...]`"#));
    };
    let Expr::Array(ExprArray { elems, .. }) = &nv.value else {
        return Err(Error::new_spanned(&nv.value, "expected an array of method names"));
    };
    elems
        .iter()
        .map(|elem| match elem {
            Expr::Lit(ExprLit {
                lit: Lit::Str(lit), ..
            }) => {
                let name = lit.value();
                if name.trim().is_empty() || name.trim() != name {
                    Err(Error::new_spanned(lit, "method name is blank or padded with whitespace"))
                } else {
                    Ok(lit.clone())
                }
            }
            other => Err(Error::new_spanned(other, "expected a string literal")),
        })
        .collect()
}

/// `sink = path::to::function`
fn parse_path(meta: &Meta) -> Result<Path> {
    match meta {
        Meta::NameValue(nv) => match &nv.value {
            Expr::Path(expr) => Ok(expr.path.clone()),
            other => Err(Error::new_spanned(other, "expected a path to a sink function")),
        },
        _ => Err(Error::new_spanned(meta, "expected `sink = path::to::function`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::quote;

    #[test]
    fn test_empty_uses_defaults() {
        let options = TraceOptions::parse(TokenStream::new()).unwrap();
        assert!(options.disable.is_empty());
        assert!(!options.perf);
        assert!(!options.mem_watch);
        assert!(options.log_input);
        assert!(!options.beautify);
        assert!(options.sink.is_none());
    }

    #[test]
    fn test_full_option_list() {
        let options = TraceOptions::parse(quote! {
            disable = ["health", "ping"],
            perf,
            mem_watch = true,
            log_input(enabled = true, beautify = true),
            sink = crate::sinks::capture,
        })
        .unwrap();

        assert!(options.is_disabled("health"));
        assert!(options.is_disabled("ping"));
        assert!(!options.is_disabled("place"));
        assert!(options.perf);
        assert!(options.mem_watch);
        assert!(options.log_input);
        assert!(options.beautify);
        let sink = options.sink.unwrap();
        assert_eq!(quote!(#sink).to_string(), "crate :: sinks :: capture");
    }

    #[test]
    fn test_log_input_shorthand() {
        let options = TraceOptions::parse(quote!(log_input = false, perf = false)).unwrap();
        assert!(!options.log_input);
        assert!(!options.perf);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = TraceOptions::parse(quote!(perf, memwatch)).unwrap_err();
        assert!(err.to_string().contains("unknown trace option `memwatch`"));
    }

    #[test]
    fn test_unknown_log_input_key_rejected() {
        let err = TraceOptions::parse(quote!(log_input(pretty = true))).unwrap_err();
        assert!(err.to_string().contains("unknown log_input option `pretty`"));
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(TraceOptions::parse(quote!(perf = "yes")).is_err());
        assert!(TraceOptions::parse(quote!(disable = "health")).is_err());
        assert!(TraceOptions::parse(quote!(disable = [health])).is_err());
        assert!(TraceOptions::parse(quote!(disable = [" health"])).is_err());
        assert!(TraceOptions::parse(quote!(sink = 3)).is_err());
        assert!(TraceOptions::parse(quote!(sink)).is_err());
    }
}
