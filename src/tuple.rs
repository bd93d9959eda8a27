use std::{fmt::Display, sync::Arc};

use crate::{
    error::{DbError, Result},
    page::RecordId,
};

/// Width of the string payload used when a schema says just `string`.
pub const STRING_LEN: usize = 128;

const INT_BYTES: usize = 4;

/// The type of a single field. Strings carry their fixed payload width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Str(usize),
}

impl Type {
    /// The default-width string type
    pub fn string() -> Self {
        Type::Str(STRING_LEN)
    }

    /// Bytes this type occupies inside a tuple image
    pub fn width(&self) -> usize {
        match self {
            Type::Int => INT_BYTES,
            Type::Str(max) => INT_BYTES + max,
        }
    }

    /// Decode one field of this type from the front of `bytes`
    pub fn parse(&self, bytes: &[u8]) -> Result<Field> {
        if bytes.len() < self.width() {
            return Err(DbError::Parse(format!(
                "need {} bytes for {self}, have {}",
                self.width(),
                bytes.len()
            )));
        }
        match self {
            Type::Int => Ok(Field::Int(read_i32(bytes))),
            Type::Str(max) => {
                let length = (read_i32(bytes).max(0) as usize).min(*max);
                let payload = &bytes[INT_BYTES..INT_BYTES + length];
                Ok(Field::Str(String::from_utf8_lossy(payload).into_owned()))
            }
        }
    }

    /// Parse a schema type name: `int` or `string`
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" => Ok(Type::Int),
            "string" => Ok(Type::string()),
            other => Err(DbError::Parse(format!("unknown type {other}"))),
        }
    }

    fn default_field(&self) -> Field {
        match self {
            Type::Int => Field::Int(0),
            Type::Str(_) => Field::Str(String::new()),
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Str(_) => write!(f, "string"),
        }
    }
}

fn read_i32(bytes: &[u8]) -> i32 {
    let mut word = [0u8; INT_BYTES];
    word.copy_from_slice(&bytes[..INT_BYTES]);
    i32::from_be_bytes(word)
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    pub fn matches(&self, field_type: &Type) -> bool {
        matches!(
            (self, field_type),
            (Field::Int(_), Type::Int) | (Field::Str(_), Type::Str(_))
        )
    }

    /// Write this field as `field_type` into the front of `out`.
    /// Strings longer than the type's width are cut at a character boundary.
    pub fn serialize(&self, field_type: &Type, out: &mut [u8]) {
        match (self, field_type) {
            (Field::Int(value), _) => out[..INT_BYTES].copy_from_slice(&value.to_be_bytes()),
            (Field::Str(value), Type::Str(max)) => {
                let mut length = value.len().min(*max);
                while !value.is_char_boundary(length) {
                    length -= 1;
                }
                out[..INT_BYTES].copy_from_slice(&(length as i32).to_be_bytes());
                out[INT_BYTES..INT_BYTES + length].copy_from_slice(&value.as_bytes()[..length]);
                out[INT_BYTES + length..INT_BYTES + max].fill(0);
            }
            (Field::Str(_), Type::Int) => out[..INT_BYTES].fill(0),
        }
    }

    /// Parse a textual value as `field_type`
    pub fn parse_text(text: &str, field_type: &Type) -> Result<Self> {
        match field_type {
            Type::Int => text
                .trim()
                .parse::<i32>()
                .map(Field::Int)
                .map_err(|e| DbError::Parse(format!("{text:?} is not an int: {e}"))),
            Type::Str(_) => Ok(Field::Str(text.trim().to_string())),
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Int(value) => write!(f, "{value}"),
            Field::Str(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone)]
struct TdItem {
    field_type: Type,
    field_name: Option<String>,
}

/// The schema of a tuple: an ordered list of typed, optionally named fields.
///
/// Two descriptors are equal when their field types match position by position;
/// names are not compared.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    /// Build a descriptor from types and names. Missing names are left anonymous.
    pub fn new(types: &[Type], names: &[&str]) -> Self {
        let items = types
            .iter()
            .enumerate()
            .map(|(i, field_type)| TdItem {
                field_type: *field_type,
                field_name: names.get(i).map(|name| name.to_string()),
            })
            .collect();
        Self { items }
    }

    pub fn from_types(types: &[Type]) -> Self {
        Self::new(types, &[])
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_type(&self, i: usize) -> Result<Type> {
        self.items
            .get(i)
            .map(|item| item.field_type)
            .ok_or(DbError::NoSuchElement)
    }

    pub fn field_name(&self, i: usize) -> Result<Option<&str>> {
        self.items
            .get(i)
            .map(|item| item.field_name.as_deref())
            .ok_or(DbError::NoSuchElement)
    }

    pub fn field_name_to_index(&self, name: &str) -> Result<usize> {
        self.items
            .iter()
            .position(|item| item.field_name.as_deref() == Some(name))
            .ok_or(DbError::NoSuchElement)
    }

    pub fn types(&self) -> impl Iterator<Item = Type> + '_ {
        self.items.iter().map(|item| item.field_type)
    }

    /// Bytes needed to store one tuple of this schema
    pub fn size(&self) -> usize {
        self.items.iter().map(|item| item.field_type.width()).sum()
    }

    /// Concatenate two descriptors, `first` fields before `second`
    pub fn merge(first: &TupleDesc, second: &TupleDesc) -> TupleDesc {
        let mut items = first.items.clone();
        items.extend(second.items.iter().cloned());
        TupleDesc { items }
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.num_fields() == other.num_fields() && self.types().eq(other.types())
    }
}

impl Eq for TupleDesc {}

impl Display for TupleDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{}({})",
                item.field_name.as_deref().unwrap_or("null"),
                item.field_type
            )?;
        }
        Ok(())
    }
}

/// A record conforming to a [`TupleDesc`], optionally tied to the slot it lives in.
#[derive(Debug, Clone)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// A tuple with every field set to its type's zero value
    pub fn new(desc: Arc<TupleDesc>) -> Self {
        let fields = desc.types().map(|t| t.default_field()).collect();
        Self {
            desc,
            fields,
            record_id: None,
        }
    }

    pub fn from_fields(desc: Arc<TupleDesc>, fields: Vec<Field>) -> Result<Self> {
        if fields.len() != desc.num_fields()
            || !fields.iter().zip(desc.types()).all(|(f, t)| f.matches(&t))
        {
            return Err(DbError::SchemaMismatch {
                expected: desc.to_string(),
                found: fields
                    .iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        Ok(Self {
            desc,
            fields,
            record_id: None,
        })
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn set_field(&mut self, i: usize, field: Field) -> Result<()> {
        let field_type = self.desc.field_type(i)?;
        if !field.matches(&field_type) {
            return Err(DbError::SchemaMismatch {
                expected: field_type.to_string(),
                found: field.to_string(),
            });
        }
        self.fields[i] = field;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Write the tuple image into `out`, which must be at least `desc.size()` bytes
    pub fn serialize_into(&self, out: &mut [u8]) {
        let mut offset = 0;
        for (field, field_type) in self.fields.iter().zip(self.desc.types()) {
            let width = field_type.width();
            field.serialize(&field_type, &mut out[offset..offset + width]);
            offset += width;
        }
    }

    /// Decode a tuple image written by [`Tuple::serialize_into`]
    pub fn deserialize(desc: &Arc<TupleDesc>, bytes: &[u8]) -> Result<Self> {
        let mut fields = Vec::with_capacity(desc.num_fields());
        let mut offset = 0;
        for field_type in desc.types() {
            fields.push(field_type.parse(&bytes[offset..])?);
            offset += field_type.width();
        }
        Ok(Self {
            desc: Arc::clone(desc),
            fields,
            record_id: None,
        })
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let line = self
            .fields
            .iter()
            .map(|field| field.to_string())
            .collect::<Vec<_>>()
            .join("\t");
        write!(f, "{line}")
    }
}
