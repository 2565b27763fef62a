//! Rendering of typed schema operations to postgres DDL.

use stratum_core::schema::{Column, ColumnType, SchemaOp, Table};

/// Quotes an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_type(ty: ColumnType) -> String {
    match ty {
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::BigInteger => "BIGINT".to_string(),
        ColumnType::Serial => "SERIAL".to_string(),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Varchar(len) => format!("VARCHAR({len})"),
        ColumnType::Timestamp => "TIMESTAMP".to_string(),
        ColumnType::Boolean => "BOOLEAN".to_string(),
    }
}

fn column_definition(column: &Column) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), column_type(column.ty));
    if column.primary_key {
        sql.push_str(" PRIMARY KEY");
    } else if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(default);
    }
    if let Some(fk) = &column.references {
        sql.push_str(&format!(
            " REFERENCES {} ({})",
            quote_ident(&fk.table),
            quote_ident(&fk.column)
        ));
        if fk.on_delete_cascade {
            sql.push_str(" ON DELETE CASCADE");
        }
    }
    sql
}

fn create_table(table: &Table) -> String {
    let mut items: Vec<String> = table.columns.iter().map(column_definition).collect();
    for unique in &table.unique {
        let columns: Vec<String> = unique.iter().map(|c| quote_ident(c)).collect();
        items.push(format!("UNIQUE ({})", columns.join(", ")));
    }
    format!(
        "CREATE TABLE {} ({})",
        quote_ident(&table.name),
        items.join(", ")
    )
}

/// Renders a schema operation as a single postgres statement.
///
/// Statements carry no `IF [NOT] EXISTS` guard; duplicate and undefined
/// object errors reach the caller.
pub fn render(op: &SchemaOp) -> String {
    match op {
        SchemaOp::CreateTable(table) => create_table(table),
        SchemaOp::DropTable { table } => format!("DROP TABLE {}", quote_ident(table)),
        SchemaOp::RenameTable { from, to } => format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(from),
            quote_ident(to)
        ),
        SchemaOp::AddColumn { table, column } => format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            column_definition(column)
        ),
        SchemaOp::DropColumn { table, column } => format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(table),
            quote_ident(column)
        ),
    }
}
