// ABOUTME: Per-table grouping of statements recovered from a schema dump
// ABOUTME: Accumulates classified statements and keeps them in deterministic order

use std::collections::BTreeMap;

/// A recognized statement with its schema qualifier already stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Table {
        table: String,
        text: String,
    },
    Index {
        table: String,
        index: String,
        text: String,
    },
    PrimaryKey {
        table: String,
        constraint: String,
        text: String,
    },
}

impl Statement {
    /// Name of the table the statement belongs to
    pub fn table(&self) -> &str {
        match self {
            Statement::Table { table, .. }
            | Statement::Index { table, .. }
            | Statement::PrimaryKey { table, .. } => table,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Statement::Table { text, .. }
            | Statement::Index { text, .. }
            | Statement::PrimaryKey { text, .. } => text,
        }
    }
}

/// Everything the dump says about one table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDefinition {
    /// `CREATE TABLE` statement. Missing when only indexes or constraints
    /// referenced the name, e.g. an index on a materialized view.
    pub table: Option<String>,
    pub primary_key: Option<String>,
    /// Constraint name of `primary_key`, e.g. `users_pkey`
    pub primary_key_name: Option<String>,
    /// `(index_name, statement)` pairs
    pub indexes: Vec<(String, String)>,
}

/// Table definitions keyed by table name, iterated in name order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionSet {
    tables: BTreeMap<String, TableDefinition>,
}

impl DefinitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, statement: Statement) {
        match statement {
            Statement::Table { table, text } => {
                let definition = self.tables.entry(table.clone()).or_default();
                if definition.table.replace(text).is_some() {
                    tracing::warn!(
                        "⚠ Table '{}' is created more than once, keeping the last definition",
                        table
                    );
                }
            }
            Statement::Index { table, index, text } => {
                self.tables
                    .entry(table)
                    .or_default()
                    .indexes
                    .push((index, text));
            }
            Statement::PrimaryKey {
                table,
                constraint,
                text,
            } => {
                let definition = self.tables.entry(table.clone()).or_default();
                definition.primary_key = Some(text);
                if let Some(previous) = definition.primary_key_name.replace(constraint.clone()) {
                    tracing::warn!(
                        "⚠ Table '{}' has more than one primary key, {} replaces {}",
                        table,
                        constraint,
                        previous
                    );
                }
            }
        }
    }

    /// Sort every table's indexes by `(index_name, statement)` and report
    /// names that never got a `CREATE TABLE` statement.
    pub fn finish(&mut self) {
        for (name, definition) in &mut self.tables {
            definition.indexes.sort();
            if definition.table.is_none() {
                tracing::warn!(
                    "⚠ '{}' has indexes or constraints but no CREATE TABLE statement",
                    name
                );
            }
        }
    }

    pub fn get(&self, table: &str) -> Option<&TableDefinition> {
        self.tables.get(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TableDefinition)> {
        self.tables.iter()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(table: &str, index: &str, text: &str) -> Statement {
        Statement::Index {
            table: table.to_string(),
            index: index.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_statements_group_by_table() {
        let mut set = DefinitionSet::new();
        set.insert(index(
            "users",
            "users_email_idx",
            "CREATE INDEX users_email_idx ON users (email);",
        ));
        set.insert(Statement::Table {
            table: "users".to_string(),
            text: "CREATE TABLE users (id int);".to_string(),
        });
        set.insert(Statement::Table {
            table: "accounts".to_string(),
            text: "CREATE TABLE accounts (id int);".to_string(),
        });
        set.finish();

        assert_eq!(set.len(), 2);
        assert_eq!(
            set.table_names().collect::<Vec<_>>(),
            vec!["accounts", "users"]
        );

        let users = set.get("users").unwrap();
        assert_eq!(users.table.as_deref(), Some("CREATE TABLE users (id int);"));
        assert_eq!(users.indexes.len(), 1);
        assert!(users.primary_key.is_none());
    }

    #[test]
    fn test_finish_sorts_indexes_by_name_then_text() {
        let mut set = DefinitionSet::new();
        set.insert(index("t", "t_b_idx", "CREATE INDEX t_b_idx ON t (b);"));
        set.insert(index("t", "t_a_idx", "CREATE INDEX t_a_idx ON t (z);"));
        set.insert(index("t", "t_a_idx", "CREATE INDEX t_a_idx ON t (a);"));
        set.finish();

        let names: Vec<_> = set
            .get("t")
            .unwrap()
            .indexes
            .iter()
            .map(|(_, text)| text.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "CREATE INDEX t_a_idx ON t (a);",
                "CREATE INDEX t_a_idx ON t (z);",
                "CREATE INDEX t_b_idx ON t (b);",
            ]
        );
    }

    #[test]
    fn test_later_table_statement_replaces_earlier() {
        let mut set = DefinitionSet::new();
        for text in ["CREATE TABLE t (a int);", "CREATE TABLE t (b int);"] {
            set.insert(Statement::Table {
                table: "t".to_string(),
                text: text.to_string(),
            });
        }
        assert_eq!(
            set.get("t").unwrap().table.as_deref(),
            Some("CREATE TABLE t (b int);")
        );
    }

    #[test]
    fn test_later_primary_key_replaces_earlier() {
        let mut set = DefinitionSet::new();
        for constraint in ["t_old_pkey", "t_pkey"] {
            set.insert(Statement::PrimaryKey {
                table: "t".to_string(),
                constraint: constraint.to_string(),
                text: format!(
                    "ALTER TABLE ONLY t\n    ADD CONSTRAINT {} PRIMARY KEY (id);",
                    constraint
                ),
            });
        }

        let t = set.get("t").unwrap();
        assert_eq!(t.primary_key_name.as_deref(), Some("t_pkey"));
        assert_eq!(
            t.primary_key.as_deref(),
            Some("ALTER TABLE ONLY t\n    ADD CONSTRAINT t_pkey PRIMARY KEY (id);")
        );
    }
}
