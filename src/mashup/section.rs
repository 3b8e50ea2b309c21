//! Power Query section documents generated from a tabular schema.

use phf::phf_set;
use serde_json::Value;

/// Words that cannot be used as bare identifiers.
static KEYWORDS: phf::Set<&'static str> = phf_set! {
    "and", "as", "each", "else", "error", "false", "if", "in", "is", "let",
    "meta", "not", "null", "or", "otherwise", "section", "shared", "then",
    "true", "try", "type",
};

/// Section name used by every generated document.
pub const SECTION_NAME: &str = "Section1";

/// Build a section document declaring one shared member per M expression of
/// the model.
///
/// Shared expressions of kind `m` come first, in schema order, followed by
/// one member per table whose first M partition supplies the expression; the
/// member is named after the table. The schema may be a full database
/// (`{"model": {...}}`) or the model object itself.
///
/// # Examples
///
/// ```
/// use pbixproj::generate_section_document;
/// use serde_json::json;
///
/// let schema = json!({"model": {
///     "expressions": [{"name": "Server", "kind": "m", "expression": "\"db01\""}],
///     "tables": [{"name": "Sales Orders", "partitions": [
///         {"name": "p", "source": {"type": "m", "expression": ["let", "  x = 1", "in", "  x"]}}
///     ]}]
/// }});
/// assert_eq!(
///     generate_section_document(&schema),
///     "section Section1;\n\nshared Server = \"db01\";\n\nshared #\"Sales Orders\" = let\n  x = 1\nin\n  x;"
/// );
/// ```
pub fn generate_section_document(schema: &Value) -> String {
    let model = schema.get("model").unwrap_or(schema);
    let mut document = format!("section {};", SECTION_NAME);

    let expressions = model
        .get("expressions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|expr| expr.get("kind").and_then(Value::as_str) == Some("m"))
        .filter_map(|expr| Some((expr.get("name")?.as_str()?, join_lines(expr.get("expression")?)?)));

    let tables = model
        .get("tables")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|table| {
            let name = table.get("name")?.as_str()?;
            let source = table
                .get("partitions")?
                .as_array()?
                .iter()
                .filter_map(|partition| partition.get("source"))
                .find(|source| source.get("type").and_then(Value::as_str) == Some("m"))?;
            Some((name, join_lines(source.get("expression")?)?))
        });

    for (name, expression) in expressions.chain(tables) {
        document.push_str("\n\nshared ");
        document.push_str(&quote_identifier(name));
        document.push_str(" = ");
        document.push_str(&expression);
        document.push(';');
    }
    document
}

/// Expressions are stored either as one string or as an array of lines.
fn join_lines(expression: &Value) -> Option<String> {
    match expression {
        Value::String(text) => Some(text.clone()),
        Value::Array(lines) => {
            let lines: Option<Vec<&str>> = lines.iter().map(Value::as_str).collect();
            lines.map(|lines| lines.join("\n"))
        },
        _ => None,
    }
}

/// Quote `name` as `#"..."` unless it is a plain identifier.
pub fn quote_identifier(name: &str) -> String {
    if is_plain_identifier(name) {
        return name.to_string();
    }
    format!("#\"{}\"", name.replace('"', "\"\""))
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c == '_' || c.is_alphabetic());
    starts_well
        && !name.ends_with('.')
        && !name.contains("..")
        && chars.all(|c| c == '_' || c == '.' || c.is_alphanumeric())
        && !KEYWORDS.contains(name)
}
