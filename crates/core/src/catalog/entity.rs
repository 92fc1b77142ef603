//! Schema entities and their persisted form.
//!
//! Tables, indexes and sequences are stored as ordinary rows in the
//! reserved catalog store: `{type, name, store_name, sql, definition}`.
//! The `sql` column is a rendered DDL statement kept for introspection;
//! `definition` is the binary encoding the catalog actually reloads.

use crate::error::DBError;
use crate::expr::{AggregateFunc, BinaryOp, Expr, Function, FunctionCall, Param, ScalarFunc};
use stratadb_types::{encoding, Row, Value, ValueError, ValueType};

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnConstraint {
    pub name: String,
    pub ty: Option<ValueType>,
    pub not_null: bool,
    pub unique: bool,
    pub default: Option<Expr>,
}

impl ColumnConstraint {
    pub fn new(name: impl Into<String>, ty: ValueType) -> ColumnConstraint {
        ColumnConstraint {
            name: name.into(),
            ty: Some(ty),
            not_null: false,
            unique: false,
            default: None,
        }
    }

    pub fn untyped(name: impl Into<String>) -> ColumnConstraint {
        ColumnConstraint {
            name: name.into(),
            ty: None,
            not_null: false,
            unique: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> ColumnConstraint {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> ColumnConstraint {
        self.unique = true;
        self
    }

    pub fn default_expr(mut self, e: Expr) -> ColumnConstraint {
        self.default = Some(e);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKey {
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnConstraint>,
    pub primary_key: Option<PrimaryKey>,
    pub checks: Vec<Expr>,
    /// Backing store, assigned by the catalog at creation.
    pub store_name: String,
    /// Sequence feeding generated row keys for tables without a primary
    /// key.
    pub docid_seq: Option<String>,
    pub read_only: bool,
}

impl TableInfo {
    pub fn new(name: impl Into<String>) -> TableInfo {
        TableInfo {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            checks: Vec::new(),
            store_name: String::new(),
            docid_seq: None,
            read_only: false,
        }
    }

    pub fn column(mut self, c: ColumnConstraint) -> TableInfo {
        self.columns.push(c);
        self
    }

    pub fn primary_key(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> TableInfo {
        self.primary_key = Some(PrimaryKey {
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn check(mut self, e: Expr) -> TableInfo {
        self.checks.push(e);
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnConstraint> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexPath {
    pub column: String,
    pub ty: ValueType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub table: String,
    pub paths: Vec<IndexPath>,
    pub unique: bool,
    pub store_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceInfo {
    pub name: String,
    pub start: i64,
    pub increment: i64,
    pub min: i64,
    pub max: i64,
    pub cache: u64,
    pub cycle: bool,
    /// Set when the sequence backs a table's generated keys and lives
    /// and dies with it.
    pub owner: Option<String>,
}

impl SequenceInfo {
    /// Defaults follow the increment sign, like `CREATE SEQUENCE`.
    pub fn new(name: impl Into<String>) -> SequenceInfo {
        SequenceInfo {
            name: name.into(),
            start: 1,
            increment: 1,
            min: 1,
            max: i64::MAX,
            cache: 1,
            cycle: false,
            owner: None,
        }
    }

    pub fn descending(name: impl Into<String>) -> SequenceInfo {
        SequenceInfo {
            name: name.into(),
            start: -1,
            increment: -1,
            min: i64::MIN,
            max: -1,
            cache: 1,
            cycle: false,
            owner: None,
        }
    }
}

/// One catalog row, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEntry {
    Table(TableInfo),
    Index(IndexInfo),
    Sequence(SequenceInfo),
}

impl CatalogEntry {
    pub fn name(&self) -> &str {
        match self {
            CatalogEntry::Table(t) => &t.name,
            CatalogEntry::Index(i) => &i.name,
            CatalogEntry::Sequence(s) => &s.name,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            CatalogEntry::Table(_) => "table",
            CatalogEntry::Index(_) => "index",
            CatalogEntry::Sequence(_) => "sequence",
        }
    }

    fn store_name(&self) -> &str {
        match self {
            CatalogEntry::Table(t) => &t.store_name,
            CatalogEntry::Index(i) => &i.store_name,
            CatalogEntry::Sequence(_) => "",
        }
    }

    /// The row persisted in the catalog store.
    pub fn to_row(&self) -> Row {
        let mut def = W::default();
        match self {
            CatalogEntry::Table(t) => encode_table(&mut def, t),
            CatalogEntry::Index(i) => encode_index(&mut def, i),
            CatalogEntry::Sequence(s) => encode_sequence(&mut def, s),
        }
        let mut row = Row::new();
        row.push("type", Value::Text(self.kind().to_owned()));
        row.push("name", Value::Text(self.name().to_owned()));
        row.push("store_name", Value::Text(self.store_name().to_owned()));
        row.push("sql", Value::Text(self.to_string()));
        row.push("definition", Value::Blob(def.0));
        row
    }

    pub fn from_row(row: &Row) -> Result<CatalogEntry, DBError> {
        let kind = row.get("type")?.as_text()?.to_owned();
        let def = row.get("definition")?.as_blob()?.to_vec();
        let mut r = R::new(&def);
        let entry = match kind.as_str() {
            "table" => CatalogEntry::Table(decode_table(&mut r)?),
            "index" => CatalogEntry::Index(decode_index(&mut r)?),
            "sequence" => CatalogEntry::Sequence(decode_sequence(&mut r)?),
            other => {
                return Err(ValueError::Corruption(format!("unknown catalog entry type `{other}`")).into())
            }
        };
        Ok(entry)
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogEntry::Table(t) => {
                write!(f, "CREATE TABLE {} (", t.name)?;
                for (i, c) in t.columns.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", c.name)?;
                    if let Some(ty) = c.ty {
                        write!(f, " {}", sql_type(ty))?;
                    }
                    if c.not_null {
                        write!(f, " NOT NULL")?;
                    }
                    if c.unique {
                        write!(f, " UNIQUE")?;
                    }
                    if let Some(d) = &c.default {
                        write!(f, " DEFAULT {d}")?;
                    }
                }
                if let Some(pk) = &t.primary_key {
                    write!(f, ", PRIMARY KEY ({})", pk.columns.join(", "))?;
                }
                for check in &t.checks {
                    write!(f, ", CHECK ({check})")?;
                }
                write!(f, ")")
            }
            CatalogEntry::Index(i) => {
                write!(
                    f,
                    "CREATE {}INDEX {} ON {} ({})",
                    if i.unique { "UNIQUE " } else { "" },
                    i.name,
                    i.table,
                    i.paths
                        .iter()
                        .map(|p| p.column.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            CatalogEntry::Sequence(s) => {
                write!(
                    f,
                    "CREATE SEQUENCE {} START {} INCREMENT {} MINVALUE {} MAXVALUE {} CACHE {}{}",
                    s.name,
                    s.start,
                    s.increment,
                    s.min,
                    s.max,
                    s.cache,
                    if s.cycle { " CYCLE" } else { "" }
                )
            }
        }
    }
}

fn sql_type(ty: ValueType) -> &'static str {
    match ty {
        ValueType::Null => "NULL",
        ValueType::Boolean => "BOOLEAN",
        ValueType::Integer => "INTEGER",
        ValueType::BigInt => "BIGINT",
        ValueType::Double => "DOUBLE PRECISION",
        ValueType::Text => "TEXT",
        ValueType::Blob => "BLOB",
        ValueType::Timestamp => "TIMESTAMP",
    }
}

// --- binary definition codec -------------------------------------------

#[derive(Default)]
struct W(Vec<u8>);

impl W {
    fn u8(&mut self, b: u8) {
        self.0.push(b);
    }

    fn bool(&mut self, b: bool) {
        self.0.push(b as u8);
    }

    fn uvarint(&mut self, mut v: u64) {
        loop {
            let b = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.0.push(b);
                return;
            }
            self.0.push(b | 0x80);
        }
    }

    fn i64(&mut self, v: i64) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    fn str(&mut self, s: &str) {
        self.uvarint(s.len() as u64);
        self.0.extend_from_slice(s.as_bytes());
    }

    fn bytes(&mut self, b: &[u8]) {
        self.uvarint(b.len() as u64);
        self.0.extend_from_slice(b);
    }
}

struct R<'a> {
    input: &'a [u8],
}

impl<'a> R<'a> {
    fn new(input: &'a [u8]) -> R<'a> {
        R { input }
    }

    fn corrupt() -> DBError {
        ValueError::Corruption("truncated catalog definition".into()).into()
    }

    fn u8(&mut self) -> Result<u8, DBError> {
        let (&b, rest) = self.input.split_first().ok_or_else(Self::corrupt)?;
        self.input = rest;
        Ok(b)
    }

    fn bool(&mut self) -> Result<bool, DBError> {
        Ok(self.u8()? != 0)
    }

    fn uvarint(&mut self) -> Result<u64, DBError> {
        let mut v: u64 = 0;
        let mut shift = 0u32;
        loop {
            let b = self.u8()?;
            if shift >= 63 && b > 1 {
                return Err(Self::corrupt());
            }
            v |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(v);
            }
            shift += 7;
        }
    }

    fn i64(&mut self) -> Result<i64, DBError> {
        let raw = self.take(8)?;
        Ok(i64::from_be_bytes(raw.try_into().unwrap()))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DBError> {
        if self.input.len() < n {
            return Err(Self::corrupt());
        }
        let (head, rest) = self.input.split_at(n);
        self.input = rest;
        Ok(head)
    }

    fn str(&mut self) -> Result<String, DBError> {
        let n = self.uvarint()? as usize;
        let raw = self.take(n)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| ValueError::Corruption("invalid utf-8 in catalog definition".into()).into())
    }

    fn raw_bytes(&mut self) -> Result<&'a [u8], DBError> {
        let n = self.uvarint()? as usize;
        self.take(n)
    }
}

fn encode_table(w: &mut W, t: &TableInfo) {
    w.str(&t.name);
    w.str(&t.store_name);
    w.bool(t.read_only);
    match &t.docid_seq {
        Some(s) => {
            w.bool(true);
            w.str(s);
        }
        None => w.bool(false),
    }
    w.uvarint(t.columns.len() as u64);
    for c in &t.columns {
        w.str(&c.name);
        match c.ty {
            Some(ty) => w.u8(type_tag(ty) + 1),
            None => w.u8(0),
        }
        w.bool(c.not_null);
        w.bool(c.unique);
        match &c.default {
            Some(e) => {
                w.bool(true);
                encode_expr(w, e);
            }
            None => w.bool(false),
        }
    }
    match &t.primary_key {
        Some(pk) => {
            w.uvarint(pk.columns.len() as u64 + 1);
            for c in &pk.columns {
                w.str(c);
            }
        }
        None => w.uvarint(0),
    }
    w.uvarint(t.checks.len() as u64);
    for e in &t.checks {
        encode_expr(w, e);
    }
}

fn decode_table(r: &mut R<'_>) -> Result<TableInfo, DBError> {
    let name = r.str()?;
    let store_name = r.str()?;
    let read_only = r.bool()?;
    let docid_seq = if r.bool()? { Some(r.str()?) } else { None };
    let ncols = r.uvarint()?;
    let mut columns = Vec::with_capacity(ncols as usize);
    for _ in 0..ncols {
        let cname = r.str()?;
        let ty = match r.u8()? {
            0 => None,
            tag => Some(type_from_tag(tag - 1)?),
        };
        let not_null = r.bool()?;
        let unique = r.bool()?;
        let default = if r.bool()? { Some(decode_expr(r)?) } else { None };
        columns.push(ColumnConstraint {
            name: cname,
            ty,
            not_null,
            unique,
            default,
        });
    }
    let npk = r.uvarint()?;
    let primary_key = if npk == 0 {
        None
    } else {
        let mut cols = Vec::with_capacity((npk - 1) as usize);
        for _ in 0..npk - 1 {
            cols.push(r.str()?);
        }
        Some(PrimaryKey { columns: cols })
    };
    let nchecks = r.uvarint()?;
    let mut checks = Vec::with_capacity(nchecks as usize);
    for _ in 0..nchecks {
        checks.push(decode_expr(r)?);
    }
    Ok(TableInfo {
        name,
        columns,
        primary_key,
        checks,
        store_name,
        docid_seq,
        read_only,
    })
}

fn encode_index(w: &mut W, i: &IndexInfo) {
    w.str(&i.name);
    w.str(&i.table);
    w.str(&i.store_name);
    w.bool(i.unique);
    w.uvarint(i.paths.len() as u64);
    for p in &i.paths {
        w.str(&p.column);
        w.u8(type_tag(p.ty));
    }
}

fn decode_index(r: &mut R<'_>) -> Result<IndexInfo, DBError> {
    let name = r.str()?;
    let table = r.str()?;
    let store_name = r.str()?;
    let unique = r.bool()?;
    let n = r.uvarint()?;
    let mut paths = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let column = r.str()?;
        let ty = type_from_tag(r.u8()?)?;
        paths.push(IndexPath { column, ty });
    }
    Ok(IndexInfo {
        name,
        table,
        paths,
        unique,
        store_name,
    })
}

fn encode_sequence(w: &mut W, s: &SequenceInfo) {
    w.str(&s.name);
    w.i64(s.start);
    w.i64(s.increment);
    w.i64(s.min);
    w.i64(s.max);
    w.uvarint(s.cache);
    w.bool(s.cycle);
    match &s.owner {
        Some(o) => {
            w.bool(true);
            w.str(o);
        }
        None => w.bool(false),
    }
}

fn decode_sequence(r: &mut R<'_>) -> Result<SequenceInfo, DBError> {
    Ok(SequenceInfo {
        name: r.str()?,
        start: r.i64()?,
        increment: r.i64()?,
        min: r.i64()?,
        max: r.i64()?,
        cache: r.uvarint()?,
        cycle: r.bool()?,
        owner: {
            let has = r.bool()?;
            if has {
                Some(r.str()?)
            } else {
                None
            }
        },
    })
}

fn type_tag(ty: ValueType) -> u8 {
    match ty {
        ValueType::Null => 0,
        ValueType::Boolean => 1,
        ValueType::Integer => 2,
        ValueType::BigInt => 3,
        ValueType::Double => 4,
        ValueType::Text => 5,
        ValueType::Blob => 6,
        ValueType::Timestamp => 7,
    }
}

fn type_from_tag(tag: u8) -> Result<ValueType, DBError> {
    Ok(match tag {
        0 => ValueType::Null,
        1 => ValueType::Boolean,
        2 => ValueType::Integer,
        3 => ValueType::BigInt,
        4 => ValueType::Double,
        5 => ValueType::Text,
        6 => ValueType::Blob,
        7 => ValueType::Timestamp,
        other => {
            return Err(ValueError::Corruption(format!("unknown type tag {other}")).into());
        }
    })
}

// Expression codec: tag byte per variant, children in order.

const E_LITERAL: u8 = 1;
const E_COLUMN: u8 = 2;
const E_PARENS: u8 = 3;
const E_NAMED: u8 = 4;
const E_WILDCARD: u8 = 5;
const E_LIST: u8 = 6;
const E_ROW: u8 = 7;
const E_BINARY: u8 = 8;
const E_NOT: u8 = 9;
const E_NEG: u8 = 10;
const E_BETWEEN: u8 = 11;
const E_CAST: u8 = 12;
const E_CALL: u8 = 13;
const E_PARAM_POS: u8 = 14;
const E_PARAM_NAMED: u8 = 15;
const E_NEXT_VALUE: u8 = 16;

fn encode_expr(w: &mut W, e: &Expr) {
    match e {
        Expr::Literal(v) => {
            w.u8(E_LITERAL);
            let mut buf = Vec::new();
            encoding::encode_value(v, &mut buf);
            w.bytes(&buf);
        }
        Expr::Column(name) => {
            w.u8(E_COLUMN);
            w.str(name);
        }
        Expr::Parens(inner) => {
            w.u8(E_PARENS);
            encode_expr(w, inner);
        }
        Expr::Named { expr, alias } => {
            w.u8(E_NAMED);
            w.str(alias);
            encode_expr(w, expr);
        }
        Expr::Wildcard => w.u8(E_WILDCARD),
        Expr::List(items) => {
            w.u8(E_LIST);
            w.uvarint(items.len() as u64);
            for e in items {
                encode_expr(w, e);
            }
        }
        Expr::RowExpr(pairs) => {
            w.u8(E_ROW);
            w.uvarint(pairs.len() as u64);
            for (name, e) in pairs {
                w.str(name);
                encode_expr(w, e);
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            w.u8(E_BINARY);
            w.u8(binop_tag(*op));
            encode_expr(w, lhs);
            encode_expr(w, rhs);
        }
        Expr::Not(inner) => {
            w.u8(E_NOT);
            encode_expr(w, inner);
        }
        Expr::Neg(inner) => {
            w.u8(E_NEG);
            encode_expr(w, inner);
        }
        Expr::Between { expr, low, high } => {
            w.u8(E_BETWEEN);
            encode_expr(w, expr);
            encode_expr(w, low);
            encode_expr(w, high);
        }
        Expr::Cast { expr, to } => {
            w.u8(E_CAST);
            w.u8(type_tag(*to));
            encode_expr(w, expr);
        }
        Expr::Call(call) => {
            w.u8(E_CALL);
            w.u8(func_tag(call.func));
            w.uvarint(call.args.len() as u64);
            for a in &call.args {
                encode_expr(w, a);
            }
        }
        Expr::Parameter(Param::Positional(i)) => {
            w.u8(E_PARAM_POS);
            w.uvarint(*i as u64);
        }
        Expr::Parameter(Param::Named(name)) => {
            w.u8(E_PARAM_NAMED);
            w.str(name);
        }
        Expr::NextValueFor(name) => {
            w.u8(E_NEXT_VALUE);
            w.str(name);
        }
    }
}

fn decode_expr(r: &mut R<'_>) -> Result<Expr, DBError> {
    let tag = r.u8()?;
    let e = match tag {
        E_LITERAL => {
            let raw = r.raw_bytes()?;
            Expr::Literal(encoding::decode_value(raw)?)
        }
        E_COLUMN => Expr::Column(r.str()?),
        E_PARENS => Expr::Parens(Box::new(decode_expr(r)?)),
        E_NAMED => {
            let alias = r.str()?;
            Expr::Named {
                expr: Box::new(decode_expr(r)?),
                alias,
            }
        }
        E_WILDCARD => Expr::Wildcard,
        E_LIST => {
            let n = r.uvarint()?;
            let mut items = Vec::with_capacity(n as usize);
            for _ in 0..n {
                items.push(decode_expr(r)?);
            }
            Expr::List(items)
        }
        E_ROW => {
            let n = r.uvarint()?;
            let mut pairs = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let name = r.str()?;
                pairs.push((name, decode_expr(r)?));
            }
            Expr::RowExpr(pairs)
        }
        E_BINARY => {
            let op = binop_from_tag(r.u8()?)?;
            Expr::Binary {
                op,
                lhs: Box::new(decode_expr(r)?),
                rhs: Box::new(decode_expr(r)?),
            }
        }
        E_NOT => Expr::Not(Box::new(decode_expr(r)?)),
        E_NEG => Expr::Neg(Box::new(decode_expr(r)?)),
        E_BETWEEN => Expr::Between {
            expr: Box::new(decode_expr(r)?),
            low: Box::new(decode_expr(r)?),
            high: Box::new(decode_expr(r)?),
        },
        E_CAST => {
            let to = type_from_tag(r.u8()?)?;
            Expr::Cast {
                expr: Box::new(decode_expr(r)?),
                to,
            }
        }
        E_CALL => {
            let func = func_from_tag(r.u8()?)?;
            let n = r.uvarint()?;
            let mut args = Vec::with_capacity(n as usize);
            for _ in 0..n {
                args.push(decode_expr(r)?);
            }
            Expr::Call(FunctionCall { func, args })
        }
        E_PARAM_POS => Expr::Parameter(Param::Positional(r.uvarint()? as usize)),
        E_PARAM_NAMED => Expr::Parameter(Param::Named(r.str()?)),
        E_NEXT_VALUE => Expr::NextValueFor(r.str()?),
        other => {
            return Err(ValueError::Corruption(format!("unknown expression tag {other}")).into());
        }
    };
    Ok(e)
}

fn binop_tag(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Add => 0,
        BinaryOp::Sub => 1,
        BinaryOp::Mul => 2,
        BinaryOp::Div => 3,
        BinaryOp::Rem => 4,
        BinaryOp::BitAnd => 5,
        BinaryOp::BitOr => 6,
        BinaryOp::BitXor => 7,
        BinaryOp::Eq => 8,
        BinaryOp::Neq => 9,
        BinaryOp::Lt => 10,
        BinaryOp::Lte => 11,
        BinaryOp::Gt => 12,
        BinaryOp::Gte => 13,
        BinaryOp::And => 14,
        BinaryOp::Or => 15,
        BinaryOp::Concat => 16,
        BinaryOp::Like => 17,
        BinaryOp::In => 18,
        BinaryOp::NotIn => 19,
        BinaryOp::Is => 20,
        BinaryOp::IsNot => 21,
    }
}

fn binop_from_tag(tag: u8) -> Result<BinaryOp, DBError> {
    Ok(match tag {
        0 => BinaryOp::Add,
        1 => BinaryOp::Sub,
        2 => BinaryOp::Mul,
        3 => BinaryOp::Div,
        4 => BinaryOp::Rem,
        5 => BinaryOp::BitAnd,
        6 => BinaryOp::BitOr,
        7 => BinaryOp::BitXor,
        8 => BinaryOp::Eq,
        9 => BinaryOp::Neq,
        10 => BinaryOp::Lt,
        11 => BinaryOp::Lte,
        12 => BinaryOp::Gt,
        13 => BinaryOp::Gte,
        14 => BinaryOp::And,
        15 => BinaryOp::Or,
        16 => BinaryOp::Concat,
        17 => BinaryOp::Like,
        18 => BinaryOp::In,
        19 => BinaryOp::NotIn,
        20 => BinaryOp::Is,
        21 => BinaryOp::IsNot,
        other => {
            return Err(ValueError::Corruption(format!("unknown operator tag {other}")).into());
        }
    })
}

fn func_tag(f: Function) -> u8 {
    match f {
        Function::Scalar(s) => match s {
            ScalarFunc::Lower => 0,
            ScalarFunc::Upper => 1,
            ScalarFunc::Trim => 2,
            ScalarFunc::Ltrim => 3,
            ScalarFunc::Rtrim => 4,
            ScalarFunc::Len => 5,
            ScalarFunc::Coalesce => 6,
            ScalarFunc::Typeof => 7,
            ScalarFunc::Now => 8,
            ScalarFunc::Random => 9,
            ScalarFunc::Floor => 10,
            ScalarFunc::Ceil => 11,
            ScalarFunc::Abs => 12,
            ScalarFunc::Sqrt => 13,
            ScalarFunc::Acos => 14,
            ScalarFunc::Asin => 15,
            ScalarFunc::Atan => 16,
            ScalarFunc::Atan2 => 17,
        },
        Function::Aggregate(a) => match a {
            AggregateFunc::Count => 100,
            AggregateFunc::Min => 101,
            AggregateFunc::Max => 102,
            AggregateFunc::Sum => 103,
            AggregateFunc::Avg => 104,
        },
    }
}

fn func_from_tag(tag: u8) -> Result<Function, DBError> {
    Ok(match tag {
        0 => Function::Scalar(ScalarFunc::Lower),
        1 => Function::Scalar(ScalarFunc::Upper),
        2 => Function::Scalar(ScalarFunc::Trim),
        3 => Function::Scalar(ScalarFunc::Ltrim),
        4 => Function::Scalar(ScalarFunc::Rtrim),
        5 => Function::Scalar(ScalarFunc::Len),
        6 => Function::Scalar(ScalarFunc::Coalesce),
        7 => Function::Scalar(ScalarFunc::Typeof),
        8 => Function::Scalar(ScalarFunc::Now),
        9 => Function::Scalar(ScalarFunc::Random),
        10 => Function::Scalar(ScalarFunc::Floor),
        11 => Function::Scalar(ScalarFunc::Ceil),
        12 => Function::Scalar(ScalarFunc::Abs),
        13 => Function::Scalar(ScalarFunc::Sqrt),
        14 => Function::Scalar(ScalarFunc::Acos),
        15 => Function::Scalar(ScalarFunc::Asin),
        16 => Function::Scalar(ScalarFunc::Atan),
        17 => Function::Scalar(ScalarFunc::Atan2),
        100 => Function::Aggregate(AggregateFunc::Count),
        101 => Function::Aggregate(AggregateFunc::Min),
        102 => Function::Aggregate(AggregateFunc::Max),
        103 => Function::Aggregate(AggregateFunc::Sum),
        104 => Function::Aggregate(AggregateFunc::Avg),
        other => {
            return Err(ValueError::Corruption(format!("unknown function tag {other}")).into());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_roundtrip() {
        let info = TableInfo::new("users")
            .column(ColumnConstraint::new("id", ValueType::BigInt).not_null())
            .column(
                ColumnConstraint::new("name", ValueType::Text)
                    .default_expr(Expr::Literal(Value::Text("anon".into()))),
            )
            .column(ColumnConstraint::untyped("extra"))
            .primary_key(["id"])
            .check(Expr::binary(
                BinaryOp::Gt,
                Expr::column("id"),
                Expr::Literal(Value::BigInt(0)),
            ));
        let mut info = info;
        info.store_name = "t1".into();

        let entry = CatalogEntry::Table(info.clone());
        let decoded = CatalogEntry::from_row(&entry.to_row()).unwrap();
        assert_eq!(decoded, CatalogEntry::Table(info));
    }

    #[test]
    fn test_index_roundtrip() {
        let info = IndexInfo {
            name: "users_name".into(),
            table: "users".into(),
            paths: vec![IndexPath {
                column: "name".into(),
                ty: ValueType::Text,
            }],
            unique: true,
            store_name: "i1".into(),
        };
        let entry = CatalogEntry::Index(info.clone());
        let decoded = CatalogEntry::from_row(&entry.to_row()).unwrap();
        assert_eq!(decoded, CatalogEntry::Index(info));
    }

    #[test]
    fn test_sequence_roundtrip() {
        let mut info = SequenceInfo::new("s");
        info.cycle = true;
        info.owner = Some("users".into());
        let entry = CatalogEntry::Sequence(info.clone());
        let decoded = CatalogEntry::from_row(&entry.to_row()).unwrap();
        assert_eq!(decoded, CatalogEntry::Sequence(info));
    }

    #[test]
    fn test_sql_rendering() {
        let mut info = TableInfo::new("t")
            .column(ColumnConstraint::new("a", ValueType::Integer).not_null())
            .column(ColumnConstraint::new("b", ValueType::Text))
            .primary_key(["a"]);
        info.store_name = "t1".into();
        assert_eq!(
            CatalogEntry::Table(info).to_string(),
            "CREATE TABLE t (a INTEGER NOT NULL, b TEXT, PRIMARY KEY (a))"
        );
    }
}
