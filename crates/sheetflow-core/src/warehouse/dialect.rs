//! SQL generation per warehouse family

use crate::table::{SemanticType, TextCapacity};

use super::{ColumnDefinition, Identifier, InsertStatement, Statement, TableDefinition};

/// SQL Server's widest bounded NVARCHAR
pub const SQL_SERVER_MAX_NVARCHAR: usize = 4000;

pub trait Dialect: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Longest identifier the backend accepts
    fn max_identifier_len(&self) -> usize;

    /// Most bind parameters one statement may carry
    fn max_bind_params(&self) -> usize;

    fn quote(&self, identifier: &Identifier) -> String;

    fn column_type(&self, semantic_type: SemanticType) -> String;

    fn drop_table_if_exists(&self, table: &Identifier) -> String;

    fn create_table(&self, definition: &TableDefinition, if_not_exists: bool) -> String;

    fn render(&self, statement: &Statement) -> String {
        match statement {
            Statement::DropTableIfExists { table } => self.drop_table_if_exists(table),
            Statement::CreateTable {
                definition,
                if_not_exists,
            } => self.create_table(definition, *if_not_exists),
        }
    }

    fn column_definition(&self, column: &ColumnDefinition) -> String {
        format!(
            "{} {} {}",
            self.quote(&column.name),
            self.column_type(column.semantic_type),
            if column.nullable { "NULL" } else { "NOT NULL" }
        )
    }

    fn column_list(&self, definition: &TableDefinition) -> String {
        definition
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `INSERT INTO t (a, b) ` with the trailing space; VALUES follows
    fn insert_prefix(&self, insert: &InsertStatement) -> String {
        let columns = insert
            .columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!("INSERT INTO {} ({}) ", self.quote(&insert.table), columns)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn max_identifier_len(&self) -> usize {
        63
    }

    fn max_bind_params(&self) -> usize {
        65535
    }

    fn quote(&self, identifier: &Identifier) -> String {
        format!("\"{}\"", identifier.as_str())
    }

    fn column_type(&self, semantic_type: SemanticType) -> String {
        match semantic_type {
            SemanticType::Integer => "BIGINT".to_string(),
            SemanticType::Float => "DOUBLE PRECISION".to_string(),
            SemanticType::Text(TextCapacity::Bounded(n)) => format!("VARCHAR({})", n.max(1)),
            SemanticType::Text(TextCapacity::Unbounded) => "TEXT".to_string(),
            SemanticType::DateTime => "TIMESTAMP".to_string(),
        }
    }

    fn drop_table_if_exists(&self, table: &Identifier) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(table))
    }

    fn create_table(&self, definition: &TableDefinition, if_not_exists: bool) -> String {
        format!(
            "CREATE TABLE {}{} ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            self.quote(&definition.name),
            self.column_list(definition)
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn max_identifier_len(&self) -> usize {
        128
    }

    fn max_bind_params(&self) -> usize {
        2100
    }

    fn quote(&self, identifier: &Identifier) -> String {
        format!("[{}]", identifier.as_str())
    }

    fn column_type(&self, semantic_type: SemanticType) -> String {
        match semantic_type {
            SemanticType::Integer => "BIGINT".to_string(),
            SemanticType::Float => "FLOAT".to_string(),
            SemanticType::Text(TextCapacity::Bounded(n)) if n <= SQL_SERVER_MAX_NVARCHAR => {
                format!("NVARCHAR({})", n.max(1))
            },
            SemanticType::Text(_) => "NVARCHAR(MAX)".to_string(),
            SemanticType::DateTime => "DATETIME2".to_string(),
        }
    }

    fn drop_table_if_exists(&self, table: &Identifier) -> String {
        format!(
            "IF OBJECT_ID(N'{}', N'U') IS NOT NULL DROP TABLE {}",
            table.as_str(),
            self.quote(table)
        )
    }

    fn create_table(&self, definition: &TableDefinition, if_not_exists: bool) -> String {
        let create = format!(
            "CREATE TABLE {} ({})",
            self.quote(&definition.name),
            self.column_list(definition)
        );
        if if_not_exists {
            format!(
                "IF OBJECT_ID(N'{}', N'U') IS NULL {}",
                definition.name.as_str(),
                create
            )
        } else {
            create
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn definition() -> TableDefinition {
        TableDefinition {
            name: Identifier::sanitize("products", 63).unwrap(),
            columns: vec![
                ColumnDefinition {
                    name: Identifier::sanitize("id", 63).unwrap(),
                    semantic_type: SemanticType::Integer,
                    nullable: false,
                },
                ColumnDefinition {
                    name: Identifier::sanitize("name", 63).unwrap(),
                    semantic_type: SemanticType::Text(TextCapacity::Bounded(40)),
                    nullable: true,
                },
            ],
        }
    }

    #[test]
    fn test_postgres_create_table() {
        let sql = PostgresDialect.create_table(&definition(), true);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"products\" (\"id\" BIGINT NOT NULL, \"name\" VARCHAR(40) NULL)"
        );
    }

    #[test]
    fn test_sqlserver_guards_and_types() {
        let dialect = SqlServerDialect;
        let table = Identifier::sanitize("products", 128).unwrap();
        assert_eq!(
            dialect.drop_table_if_exists(&table),
            "IF OBJECT_ID(N'products', N'U') IS NOT NULL DROP TABLE [products]"
        );
        assert!(dialect
            .create_table(&definition(), true)
            .starts_with("IF OBJECT_ID(N'products', N'U') IS NULL CREATE TABLE [products]"));
        assert_eq!(
            dialect.column_type(SemanticType::Text(TextCapacity::Bounded(9000))),
            "NVARCHAR(MAX)"
        );
        assert_eq!(dialect.column_type(SemanticType::Float), "FLOAT");
    }

    #[test]
    fn test_insert_prefix() {
        let insert = definition().insert_statement();
        assert_eq!(
            PostgresDialect.insert_prefix(&insert),
            "INSERT INTO \"products\" (\"id\", \"name\") "
        );
    }
}
