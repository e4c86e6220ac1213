// ABOUTME: Scanner and classifier for pg_dump --schema-only output
// ABOUTME: Collects table, index and primary key blocks and strips the schema qualifier

use super::definitions::{DefinitionSet, Statement};
use crate::error::SchemaError;

/// Statement shapes that open a block in the dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opener {
    Table,
    Index,
    PrimaryKey,
}

/// A whitespace-separated word and its byte range in the line. Whitespace
/// inside double quotes does not split, so `public."my table"` is one word.
#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    start: usize,
    text: &'a str,
}

impl Token<'_> {
    fn end(&self) -> usize {
        self.start + self.text.len()
    }

    fn is(&self, keyword: &str) -> bool {
        self.text.eq_ignore_ascii_case(keyword)
    }
}

fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = None;
    let mut quoted = false;

    for (idx, ch) in line.char_indices() {
        if ch.is_whitespace() && !quoted {
            if let Some(s) = start.take() {
                tokens.push(Token {
                    start: s,
                    text: &line[s..idx],
                });
            }
            continue;
        }
        if start.is_none() {
            start = Some(idx);
        }
        // An escaped `""` toggles twice and stays inside the identifier
        if ch == '"' {
            quoted = !quoted;
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            start: s,
            text: &line[s..],
        });
    }

    tokens
}

const TABLE_MODIFIERS: &[&str] = &["GLOBAL", "LOCAL", "TEMP", "TEMPORARY", "UNLOGGED", "FOREIGN"];

/// Position right after `CREATE [modifiers] TABLE`, if the line starts that way
fn after_create_table(tokens: &[Token]) -> Option<usize> {
    if !tokens.first()?.is("CREATE") {
        return None;
    }
    let mut idx = 1;
    while tokens
        .get(idx)
        .is_some_and(|t| TABLE_MODIFIERS.iter().any(|m| t.is(m)))
    {
        idx += 1;
    }
    tokens.get(idx)?.is("TABLE").then_some(idx + 1)
}

/// Position right after `CREATE [UNIQUE] INDEX`, if the line starts that way
fn after_create_index(tokens: &[Token]) -> Option<usize> {
    if !tokens.first()?.is("CREATE") {
        return None;
    }
    let mut idx = 1;
    if tokens.get(idx).is_some_and(|t| t.is("UNIQUE")) {
        idx += 1;
    }
    tokens.get(idx)?.is("INDEX").then_some(idx + 1)
}

/// Position right after `ALTER TABLE`, if the line starts that way
fn after_alter_table(tokens: &[Token]) -> Option<usize> {
    (tokens.first()?.is("ALTER") && tokens.get(1)?.is("TABLE")).then_some(2)
}

fn find_pair(tokens: &[Token], first: &str, second: &str) -> Option<usize> {
    tokens
        .windows(2)
        .position(|pair| pair[0].is(first) && pair[1].is(second))
}

fn is_primary_key_clause(line: &str) -> bool {
    let tokens = tokenize(line);
    find_pair(&tokens, "ADD", "CONSTRAINT").is_some()
        && find_pair(&tokens, "PRIMARY", "KEY").is_some()
}

/// Decide whether `line` opens a statement block. `next` is the following raw
/// line, needed for primary keys which pg_dump spreads over two lines.
fn opener(line: &str, next: Option<&str>) -> Option<Opener> {
    let tokens = tokenize(line);
    if after_create_table(&tokens).is_some() {
        Some(Opener::Table)
    } else if after_create_index(&tokens).is_some() {
        Some(Opener::Index)
    } else if after_alter_table(&tokens).is_some() && next.is_some_and(is_primary_key_clause) {
        Some(Opener::PrimaryKey)
    } else {
        None
    }
}

/// Skip an optional `IF [NOT] EXISTS` starting at `idx`
fn skip_if_exists(tokens: &[Token], mut idx: usize) -> usize {
    if tokens.get(idx).is_some_and(|t| t.is("IF")) {
        idx += 1;
        if tokens.get(idx).is_some_and(|t| t.is("NOT")) {
            idx += 1;
        }
        if tokens.get(idx).is_some_and(|t| t.is("EXISTS")) {
            idx += 1;
        }
    }
    idx
}

fn strip_qualifier<'a>(name: &'a str, schema: &str) -> &'a str {
    if schema.is_empty() {
        return name;
    }
    name.strip_prefix(schema)
        .and_then(|rest| rest.strip_prefix('.'))
        .or_else(|| {
            name.strip_prefix('"')
                .and_then(|rest| rest.strip_prefix(schema))
                .and_then(|rest| rest.strip_prefix("\"."))
        })
        .unwrap_or(name)
}

/// Replace `token` in `line` with its unqualified form
fn replace_token(line: &str, token: &Token, replacement: &str) -> String {
    format!("{}{}{}", &line[..token.start], replacement, &line[token.end()..])
}

fn block_text(first_line: String, rest: &[&str]) -> String {
    std::iter::once(first_line.as_str())
        .chain(rest.iter().copied())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_name(token: &Token) -> bool {
    !token.text.starts_with('(')
}

fn classify_table(block: &[&str], schema: &str) -> Option<Statement> {
    let first = block[0];
    let tokens = tokenize(first);
    let idx = skip_if_exists(&tokens, after_create_table(&tokens)?);
    let name = tokens.get(idx).filter(|t| is_name(t))?;

    let table = strip_qualifier(name.text, schema);
    Some(Statement::Table {
        table: table.to_string(),
        text: block_text(replace_token(first, name, table), &block[1..]),
    })
}

fn classify_index(block: &[&str], schema: &str) -> Option<Statement> {
    let first = block[0];
    let tokens = tokenize(first);
    let mut idx = after_create_index(&tokens)?;
    if tokens.get(idx).is_some_and(|t| t.is("CONCURRENTLY")) {
        idx += 1;
    }
    idx = skip_if_exists(&tokens, idx);

    // pg_dump always names indexes; an unnamed one means an unexpected format
    let index = tokens.get(idx).filter(|t| !t.is("ON"))?;
    idx += 1;
    if !tokens.get(idx)?.is("ON") {
        return None;
    }
    idx += 1;
    if tokens.get(idx).is_some_and(|t| t.is("ONLY")) {
        idx += 1;
    }
    let name = tokens.get(idx).filter(|t| is_name(t))?;

    let table = strip_qualifier(name.text, schema);
    Some(Statement::Index {
        table: table.to_string(),
        index: index.text.to_string(),
        text: block_text(replace_token(first, name, table), &block[1..]),
    })
}

fn classify_primary_key(block: &[&str], schema: &str) -> Option<Statement> {
    let first = block[0];
    let clause = *block.get(1)?;
    if !is_primary_key_clause(clause) {
        return None;
    }

    let tokens = tokenize(first);
    let mut idx = skip_if_exists(&tokens, after_alter_table(&tokens)?);
    if tokens.get(idx).is_some_and(|t| t.is("ONLY")) {
        idx += 1;
    }
    // The table must be the last word; the constraint lives on the next line
    let name = tokens.get(idx)?;
    if idx + 1 != tokens.len() {
        return None;
    }

    let clause_tokens = tokenize(clause);
    let constraint = clause_tokens.get(find_pair(&clause_tokens, "ADD", "CONSTRAINT")? + 2)?;

    let table = strip_qualifier(name.text, schema);
    let first_line = replace_token(first, name, table).trim_end().to_string();
    Some(Statement::PrimaryKey {
        table: table.to_string(),
        constraint: constraint.text.to_string(),
        text: block_text(first_line, &block[1..]),
    })
}

/// Classify one collected statement block.
///
/// Returns [`SchemaError::UnrecognizedStatement`] with the exact block text
/// when the block is not a table, index or primary key definition.
pub fn classify_block(block: &[&str], schema: &str) -> Result<Statement, SchemaError> {
    let unrecognized = || SchemaError::UnrecognizedStatement {
        block: block.join("\n"),
    };

    let first = *block.first().ok_or_else(unrecognized)?;
    let statement = match opener(first, block.get(1).copied()) {
        Some(Opener::Table) => classify_table(block, schema),
        Some(Opener::Index) => classify_index(block, schema),
        Some(Opener::PrimaryKey) => classify_primary_key(block, schema),
        None => None,
    };

    statement.ok_or_else(unrecognized)
}

/// Parse pg_dump schema output into per-table definitions.
///
/// Lines are skipped until one opens a table, index or primary key
/// statement; from there non-blank lines are collected until a blank line
/// (or the end of input) completes the block, which is then classified.
/// `schema` is the qualifier removed from table references.
///
/// # Errors
///
/// Fails on the first block that cannot be classified.
///
/// # Examples
///
/// ```
/// # use pg_dev_tools::schema::parse_definitions;
/// let dump = "CREATE TABLE public.users (id int);\n\n\
///             CREATE INDEX users_id_idx ON public.users (id);\n";
/// let definitions = parse_definitions(dump, "public").unwrap();
///
/// let users = definitions.get("users").unwrap();
/// assert_eq!(users.table.as_deref(), Some("CREATE TABLE users (id int);"));
/// assert_eq!(users.indexes[0].0, "users_id_idx");
/// ```
pub fn parse_definitions(dump: &str, schema: &str) -> Result<DefinitionSet, SchemaError> {
    let lines: Vec<&str> = dump.lines().collect();
    let mut definitions = DefinitionSet::new();
    let mut block: Vec<&str> = Vec::new();
    let mut seeking = true;

    for (i, line) in lines.iter().copied().enumerate() {
        if seeking {
            if opener(line, lines.get(i + 1).copied()).is_some() {
                seeking = false;
                block.push(line);
            }
        } else if !line.trim().is_empty() {
            block.push(line);
        } else {
            definitions.insert(classify_block(&block, schema)?);
            block.clear();
            seeking = true;
        }
    }
    if !block.is_empty() {
        definitions.insert(classify_block(&block, schema)?);
    }

    definitions.finish();
    Ok(definitions)
}
