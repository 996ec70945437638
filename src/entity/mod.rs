//! Entity definitions: everything that differs between the Orders and
//! OrderLines syncs lives in one `EntitySpec` value.

pub mod project;
pub mod schema;

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use self::project::{pick, pick_list};
use self::schema::{FieldSchema, MONEY_SET};

/// A JSON object as received from (or projected for) the API.
pub type Record = Map<String, Value>;

/// Maps a raw API record onto the entity's output schema.
pub type Projector = fn(&Record) -> Record;

pub struct EntitySpec {
    /// Route / metric label, e.g. `orders`.
    pub slug: &'static str,
    pub table_name: &'static str,
    /// Collection name: endpoint `{resource}.json`, array key `{resource}`.
    pub resource: &'static str,
    pub primary_keys: &'static [&'static str],
    pub watermark_field: &'static str,
    pub schema: &'static [FieldSchema],
    /// Sent as the `fields` query parameter.
    pub field_selection: &'static [&'static str],
    pub project: Projector,
}

impl fmt::Debug for EntitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySpec")
            .field("slug", &self.slug)
            .field("table_name", &self.table_name)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl EntitySpec {
    pub fn project_all(&self, raw: &[Record]) -> Vec<Record> {
        raw.iter().map(self.project).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Orders,
    OrderLines,
}

impl Entity {
    pub const ALL: [Entity; 2] = [Entity::Orders, Entity::OrderLines];
    pub const COUNT: usize = Self::ALL.len();

    pub fn spec(self) -> &'static EntitySpec {
        match self {
            Entity::Orders => &ORDERS,
            Entity::OrderLines => &ORDER_LINES,
        }
    }

    pub fn slug(self) -> &'static str {
        self.spec().slug
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Entity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "orders" | "Orders" => Ok(Entity::Orders),
            "order_lines" | "order-lines" | "OrderLines" => Ok(Entity::OrderLines),
            other => Err(format!("unknown entity `{other}`")),
        }
    }
}

// ---- Orders ----

const ORDER_FIELDS: &[&str] = &[
    "id",
    "order_number",
    "email",
    "created_at",
    "updated_at",
    "currency",
    "financial_status",
    "fulfillment_status",
    "total_price",
    "subtotal_price",
    "total_tax",
    "total_discounts",
];

const ORDER_ITEM_FIELDS: &[&str] = &["id", "product_id", "variant_id", "sku", "quantity", "price"];

const ORDER_ITEM_SCHEMA: &[FieldSchema] = &[
    FieldSchema::integer("id"),
    FieldSchema::integer("product_id"),
    FieldSchema::integer("variant_id"),
    FieldSchema::string("sku"),
    FieldSchema::integer("quantity"),
    FieldSchema::numeric("price"),
];

const ORDER_SCHEMA: &[FieldSchema] = &[
    FieldSchema::integer("id").required(),
    FieldSchema::integer("order_number"),
    FieldSchema::string("email"),
    FieldSchema::timestamp("created_at"),
    FieldSchema::timestamp("updated_at").required(),
    FieldSchema::string("currency"),
    FieldSchema::string("financial_status"),
    FieldSchema::string("fulfillment_status"),
    FieldSchema::numeric("total_price"),
    FieldSchema::numeric("subtotal_price"),
    FieldSchema::numeric("total_tax"),
    FieldSchema::numeric("total_discounts"),
    FieldSchema::record("line_items", ORDER_ITEM_SCHEMA).repeated(),
];

fn project_order(raw: &Record) -> Record {
    let mut out = pick(raw, ORDER_FIELDS);
    out.insert(
        "line_items".into(),
        pick_list(raw, "line_items", ORDER_ITEM_FIELDS),
    );
    out
}

pub static ORDERS: EntitySpec = EntitySpec {
    slug: "orders",
    table_name: "Orders",
    resource: "orders",
    primary_keys: &["id"],
    watermark_field: "updated_at",
    schema: ORDER_SCHEMA,
    field_selection: &[
        "id",
        "order_number",
        "email",
        "created_at",
        "updated_at",
        "currency",
        "financial_status",
        "fulfillment_status",
        "total_price",
        "subtotal_price",
        "total_tax",
        "total_discounts",
        "line_items",
    ],
    project: project_order,
};

// ---- OrderLines ----

const LINE_HEADER_FIELDS: &[&str] = &["id", "order_number", "created_at", "updated_at", "email"];

const LINE_ITEM_FIELDS: &[&str] = &[
    "id",
    "name",
    "price",
    "price_set",
    "quantity",
    "sku",
    "total_discount",
    "total_discount_set",
];

const LINE_ITEM_SCHEMA: &[FieldSchema] = &[
    FieldSchema::integer("id"),
    FieldSchema::string("name"),
    FieldSchema::numeric("price"),
    FieldSchema::record("price_set", MONEY_SET),
    FieldSchema::integer("quantity"),
    FieldSchema::string("sku"),
    FieldSchema::numeric("total_discount"),
    FieldSchema::record("total_discount_set", MONEY_SET),
];

const ORDER_LINES_SCHEMA: &[FieldSchema] = &[
    FieldSchema::integer("id").required(),
    FieldSchema::integer("order_number"),
    FieldSchema::timestamp("created_at"),
    FieldSchema::timestamp("updated_at").required(),
    FieldSchema::string("email"),
    FieldSchema::record("line_items", LINE_ITEM_SCHEMA).repeated(),
];

fn project_order_lines(raw: &Record) -> Record {
    let mut out = pick(raw, LINE_HEADER_FIELDS);
    out.insert(
        "line_items".into(),
        pick_list(raw, "line_items", LINE_ITEM_FIELDS),
    );
    out
}

pub static ORDER_LINES: EntitySpec = EntitySpec {
    slug: "order_lines",
    table_name: "OrderLines",
    resource: "orders",
    primary_keys: &["id"],
    watermark_field: "updated_at",
    schema: ORDER_LINES_SCHEMA,
    field_selection: &[
        "id",
        "order_number",
        "email",
        "created_at",
        "line_items",
        "updated_at",
    ],
    project: project_order_lines,
};
