//! Query string encoding for OData query options.
//!
//! Options are given as an ordered JSON object. `$select` and `$expand` are
//! converted into their OData string form, every other `$`-prefixed key is
//! rejected, and custom options (e.g. `sap-client`) pass through verbatim.
//! Keys are emitted in insertion order, so equal inputs always produce the
//! same query string.
//!
//! # Example
//!
//! ```ignore
//! let options = json!({
//!   "$expand": { "SO_2_BP": true, "SO_2_SOITEM": { "$select": ["ItemPosition", "Note"] } },
//!   "sap-client": "003"
//! });
//! assert_eq!(
//!   build_query_string(options.as_object())?,
//!   "?$expand=SO_2_BP,SO_2_SOITEM($select=ItemPosition,Note)&sap-client=003"
//! );
//! ```

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Map, Value};
use thiserror::Error;

/// Ordered mapping from option name to value.
pub type QueryOptions = Map<String, Value>;

/// Characters escaped in option values: everything `encodeURI` escapes, plus `&`, `#` and `+`.
const VALUE: &AsciiSet = &NON_ALPHANUMERIC
  .remove(b'-')
  .remove(b'_')
  .remove(b'.')
  .remove(b'!')
  .remove(b'~')
  .remove(b'*')
  .remove(b'\'')
  .remove(b'(')
  .remove(b')')
  .remove(b';')
  .remove(b',')
  .remove(b'/')
  .remove(b'?')
  .remove(b':')
  .remove(b'@')
  .remove(b'=')
  .remove(b'$');

/// Keys additionally escape `=`.
const KEY: &AsciiSet = &VALUE.add(b'=');

/// Errors raised while converting query options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
  /// A `$`-prefixed option other than `$select` or `$expand`.
  #[error("Unsupported system query option {0}")]
  UnsupportedOption(String),

  /// `$expand` was not a mapping from navigation path to options.
  #[error("$expand must be a valid object")]
  InvalidExpand,
}

/// A converted option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
  Single(String),
  /// The key is repeated once per value in the query string.
  Repeated(Vec<String>),
}

impl OptionValue {
  /// The value as it appears inside an expand option list.
  fn joined(&self) -> String {
    match self {
      Self::Single(value) => value.clone(),
      Self::Repeated(values) => values.join(","),
    }
  }
}

/// Build the query string for the given options.
///
/// Returns an empty string if there are no options, otherwise a string
/// starting with `?`.
pub fn build_query_string(options: Option<&QueryOptions>) -> Result<String, QueryError> {
  match options {
    Some(options) => Ok(build_query(&convert_query_options(options)?)),
    None => Ok(String::new()),
  }
}

/// Convert all system query options to strings, keeping the option order.
pub fn convert_query_options(
  options: &QueryOptions,
) -> Result<Vec<(String, OptionValue)>, QueryError> {
  options
    .iter()
    .map(|(key, value)| {
      let converted = match key.as_str() {
        "$select" => OptionValue::Single(match value {
          Value::Array(items) => join(items),
          other => scalar_text(other),
        }),
        "$expand" => OptionValue::Single(convert_expand(value)?),
        _ if key.starts_with('$') => return Err(QueryError::UnsupportedOption(key.clone())),
        _ => match value {
          Value::Array(items) => OptionValue::Repeated(items.iter().map(scalar_text).collect()),
          other => OptionValue::Single(scalar_text(other)),
        },
      };
      Ok((key.clone(), converted))
    })
    .collect()
}

/// Convert the value of a `$expand` option.
///
/// `true` (or `null`) expands the bare path; a nested mapping is converted
/// with [`convert_expand_options`].
pub fn convert_expand(items: &Value) -> Result<String, QueryError> {
  let Value::Object(items) = items else {
    return Err(QueryError::InvalidExpand);
  };

  let paths = items
    .iter()
    .map(|(path, options)| match options {
      Value::Object(options) => convert_expand_options(path, options),
      _ => Ok(path.clone()),
    })
    .collect::<Result<Vec<_>, _>>()?;

  Ok(paths.join(","))
}

/// Convert the options of a single expand path to `path($opt1=..;$opt2=..)`,
/// or just `path` when there are no options.
///
/// Unlike in a query string, a `null` option value is written out as `null`.
pub fn convert_expand_options(path: &str, options: &QueryOptions) -> Result<String, QueryError> {
  let converted = convert_query_options(options)?;
  let options: Vec<String> = options
    .values()
    .zip(converted)
    .map(|(raw, (name, value))| match raw {
      Value::Null => format!("{}=null", name),
      _ => format!("{}={}", name, value.joined()),
    })
    .collect();

  if options.is_empty() {
    Ok(path.to_string())
  } else {
    Ok(format!("{}({})", path, options.join(";")))
  }
}

fn build_query(options: &[(String, OptionValue)]) -> String {
  let mut pairs = Vec::new();
  for (key, value) in options {
    let key = utf8_percent_encode(key, KEY).to_string();
    match value {
      OptionValue::Single(value) => pairs.push(format!("{}={}", key, encode_value(value))),
      OptionValue::Repeated(values) => {
        pairs.extend(values.iter().map(|v| format!("{}={}", key, encode_value(v))))
      }
    }
  }

  if pairs.is_empty() {
    String::new()
  } else {
    format!("?{}", pairs.join("&"))
  }
}

fn encode_value(value: &str) -> String {
  utf8_percent_encode(value, VALUE).to_string()
}

fn join(items: &[Value]) -> String {
  items.iter().map(scalar_text).collect::<Vec<_>>().join(",")
}

/// Strings are used as-is, everything else by its JSON text.
fn scalar_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn options(value: Value) -> QueryOptions {
    match value {
      Value::Object(map) => map,
      _ => panic!("options must be an object"),
    }
  }

  #[test]
  fn test_convert_query_options() {
    let converted = convert_query_options(&options(json!({
      "foo": "bar",
      "$expand": { "baz": true },
      "$select": ["select1", "select2"]
    })))
    .unwrap();

    assert_eq!(
      converted,
      vec![
        ("foo".to_string(), OptionValue::Single("bar".to_string())),
        ("$expand".to_string(), OptionValue::Single("baz".to_string())),
        (
          "$select".to_string(),
          OptionValue::Single("select1,select2".to_string())
        ),
      ]
    );

    let converted = convert_query_options(&options(json!({ "$select": "singleSelect" }))).unwrap();
    assert_eq!(
      converted,
      vec![(
        "$select".to_string(),
        OptionValue::Single("singleSelect".to_string())
      )]
    );
  }

  #[test]
  fn test_unsupported_system_options() {
    for name in [
      "$filter",
      "$format",
      "$id",
      "$inlinecount",
      "$orderby",
      "$search",
      "$skip",
      "$skiptoken",
      "$top",
    ] {
      let mut map = QueryOptions::new();
      map.insert(name.to_string(), json!("foo"));

      let err = convert_query_options(&map).unwrap_err();
      assert_eq!(err, QueryError::UnsupportedOption(name.to_string()));
      assert_eq!(
        err.to_string(),
        format!("Unsupported system query option {}", name)
      );
    }
  }

  #[test]
  fn test_convert_expand_options() {
    assert_eq!(
      convert_expand_options(
        "foo",
        &options(json!({
          "$expand": { "bar": true },
          "$select": ["select1", "select2"]
        }))
      )
      .unwrap(),
      "foo($expand=bar;$select=select1,select2)"
    );
    assert_eq!(
      convert_expand_options("foo", &QueryOptions::new()).unwrap(),
      "foo"
    );
  }

  #[test]
  fn test_null_values() {
    let expand = json!({ "A": { "foo": null, "$select": null } });
    assert_eq!(convert_expand(&expand).unwrap(), "A(foo=null;$select=null)");

    // a top level null stays an empty value
    assert_eq!(
      build_query_string(Some(&options(json!({ "foo": null })))).unwrap(),
      "?foo="
    );
  }

  #[test]
  fn test_convert_expand() {
    for value in [json!("Address"), Value::Null] {
      let err = convert_expand(&value).unwrap_err();
      assert_eq!(err, QueryError::InvalidExpand);
      assert_eq!(err.to_string(), "$expand must be a valid object");
    }

    assert_eq!(
      convert_expand(&json!({
        "foo": true,
        "bar": null,
        "baz": { "$select": "x" }
      }))
      .unwrap(),
      "foo,bar,baz($select=x)"
    );
  }

  #[test]
  fn test_nested_expand_rejects_system_options() {
    let err = convert_expand(&json!({ "foo": { "$filter": "x" } })).unwrap_err();
    assert_eq!(err, QueryError::UnsupportedOption("$filter".to_string()));
  }

  #[test]
  fn test_build_query_string_empty() {
    assert_eq!(build_query_string(None).unwrap(), "");
    assert_eq!(build_query_string(Some(&QueryOptions::new())).unwrap(), "");
  }

  #[test]
  fn test_build_query_string_examples() {
    let fixtures = [
      (
        json!({ "foo": ["bar", "€"], "$select": "IDÖ" }),
        "foo=bar&foo=%E2%82%AC&$select=ID%C3%96",
      ),
      (json!({ "$select": ["ID"] }), "$select=ID"),
      (json!({ "$select": ["ID", "Name"] }), "$select=ID,Name"),
      (
        json!({ "$expand": { "SO_2_BP": true, "SO_2_SOITEM": true } }),
        "$expand=SO_2_BP,SO_2_SOITEM",
      ),
      (
        json!({ "$expand": { "SO_2_BP": true, "SO_2_SOITEM": { "$select": "CurrencyCode" } } }),
        "$expand=SO_2_BP,SO_2_SOITEM($select=CurrencyCode)",
      ),
      (
        json!({
          "$expand": {
            "SO_2_BP": true,
            "SO_2_SOITEM": { "$select": ["ItemPosition", "Note"] }
          }
        }),
        "$expand=SO_2_BP,SO_2_SOITEM($select=ItemPosition,Note)",
      ),
      (
        json!({
          "$expand": {
            "SO_2_BP": true,
            "SO_2_SOITEM": {
              "$expand": {
                "SOITEM_2_PRODUCT": {
                  "$expand": { "PRODUCT_2_BP": true },
                  "$select": "CurrencyCode"
                },
                "SOITEM_2_SO": true
              }
            }
          },
          "sap-client": "003"
        }),
        "$expand=SO_2_BP,SO_2_SOITEM($expand=SOITEM_2_PRODUCT($expand=PRODUCT_2_BP;\
         $select=CurrencyCode),SOITEM_2_SO)&sap-client=003",
      ),
      (
        json!({ "$expand": { "A": true, "B": { "$select": ["x", "y"] } } }),
        "$expand=A,B($select=x,y)",
      ),
    ];

    for (input, expected) in fixtures {
      assert_eq!(
        build_query_string(Some(&options(input))).unwrap(),
        format!("?{}", expected)
      );
    }
  }

  #[test]
  fn test_build_query_string_escapes_reserved_characters() {
    let query = build_query_string(Some(&options(json!({
      "a=b": "c&d",
      "e": "f#g+h i"
    }))))
    .unwrap();

    assert_eq!(query, "?a%3Db=c%26d&e=f%23g%2Bh%20i");
  }

  #[test]
  fn test_unsupported_option_at_top_level() {
    let err = build_query_string(Some(&options(json!({ "$filter": "x" })))).unwrap_err();
    assert_eq!(err, QueryError::UnsupportedOption("$filter".to_string()));
  }
}
