// src/entity/schema.rs
//
// Table schema in the BigQuery style: every column has a type and a mode,
// RECORD columns carry nested fields.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    String,
    Timestamp,
    /// Decimal kept as its exact string form.
    Numeric,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMode {
    Nullable,
    Required,
    Repeated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
    pub mode: FieldMode,
    pub fields: &'static [FieldSchema],
}

impl FieldSchema {
    const fn scalar(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            mode: FieldMode::Nullable,
            fields: &[],
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::scalar(name, FieldKind::Integer)
    }

    pub const fn string(name: &'static str) -> Self {
        Self::scalar(name, FieldKind::String)
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self::scalar(name, FieldKind::Timestamp)
    }

    pub const fn numeric(name: &'static str) -> Self {
        Self::scalar(name, FieldKind::Numeric)
    }

    pub const fn record(name: &'static str, fields: &'static [FieldSchema]) -> Self {
        Self {
            name,
            kind: FieldKind::Record,
            mode: FieldMode::Nullable,
            fields,
        }
    }

    pub const fn repeated(self) -> Self {
        Self {
            mode: FieldMode::Repeated,
            ..self
        }
    }

    pub const fn required(self) -> Self {
        Self {
            mode: FieldMode::Required,
            ..self
        }
    }

    /// SQLite column type. Records and repeated columns are stored as JSON text.
    pub fn column_type(&self) -> &'static str {
        match (self.mode, self.kind) {
            (FieldMode::Repeated, _) | (_, FieldKind::Record) => "TEXT",
            (_, FieldKind::Integer) => "INTEGER",
            (_, FieldKind::String | FieldKind::Timestamp | FieldKind::Numeric) => "TEXT",
        }
    }
}

pub fn find<'a>(schema: &'a [FieldSchema], name: &str) -> Option<&'a FieldSchema> {
    schema.iter().find(|f| f.name == name)
}

/// `{amount, currency_code}`
pub const MONEY: &[FieldSchema] = &[
    FieldSchema::numeric("amount"),
    FieldSchema::string("currency_code"),
];

/// Shop currency and presentment currency side by side.
pub const MONEY_SET: &[FieldSchema] = &[
    FieldSchema::record("shop_money", MONEY),
    FieldSchema::record("presentment_money", MONEY),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_and_repeated_columns_are_text() {
        let items = FieldSchema::record("line_items", MONEY).repeated();
        assert_eq!(items.column_type(), "TEXT");
        assert_eq!(items.mode, FieldMode::Repeated);
        assert_eq!(FieldSchema::integer("id").column_type(), "INTEGER");
        assert_eq!(FieldSchema::numeric("price").column_type(), "TEXT");
    }

    #[test]
    fn find_by_name() {
        assert_eq!(find(MONEY_SET, "shop_money").map(|f| f.kind), Some(FieldKind::Record));
        assert!(find(MONEY_SET, "nope").is_none());
    }
}
