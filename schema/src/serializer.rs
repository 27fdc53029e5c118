//! Serializers and their fields.
//!
//! A serializer is an ordered list of fields. Field paths index into it: the
//! first element selects a field, and deeper elements select array slots or
//! fields of nested serializers, depending on the field's [`FieldModel`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::decoder::{FieldDecoder, FieldProps};
use crate::error::{SchemaError, SchemaResult};
use crate::field_path::FieldPath;
use crate::var_type::VarType;

/// Base types that always nest a fixed table, pointer or not.
const FIXED_TABLE_TYPES: &[&str] = &[
    "CBodyComponent",
    "CLightComponent",
    "CPhysicsComponent",
    "CRenderComponent",
    "CPlayerLocalData",
];

/// Base types networked as variable-length vectors.
const VECTOR_TYPES: &[&str] = &[
    "CUtlVector",
    "CNetworkUtlVectorBase",
    "CUtlVectorEmbeddedNetworkVar",
];

/// How a field lays its values out under a field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldModel {
    Simple,
    FixedArray,
    VariableArray,
    FixedTable,
    VariableTable,
}

impl FieldModel {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::FixedArray => "fixed-array",
            Self::VariableArray => "variable-array",
            Self::FixedTable => "fixed-table",
            Self::VariableTable => "variable-table",
        }
    }
}

impl fmt::Display for FieldModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field layout with the decoders and nested serializer it needs.
#[derive(Debug)]
pub enum FieldKind {
    Simple(FieldDecoder),
    FixedArray { element: FieldDecoder, count: usize },
    /// Length is an unsigned varint; elements use `element`.
    VariableArray { element: FieldDecoder },
    /// Presence is a bool.
    FixedTable(Rc<Serializer>),
    /// Length is an unsigned varint.
    VariableTable(Rc<Serializer>),
}

/// One field of a serializer.
#[derive(Debug)]
pub struct Field {
    name: String,
    var_type: String,
    kind: FieldKind,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, var_type: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            var_type: var_type.into(),
            kind,
        }
    }

    /// Builds a field from its declared var type, classifying its model.
    ///
    /// `nested` is the serializer the field names, if any.
    pub fn from_declaration(
        name: impl Into<String>,
        var_type: &str,
        props: &FieldProps,
        nested: Option<Rc<Serializer>>,
    ) -> SchemaResult<Self> {
        let parsed = VarType::parse(var_type)?;
        let kind = if let Some(serializer) = nested {
            if parsed.pointer || FIXED_TABLE_TYPES.contains(&parsed.base.as_str()) {
                FieldKind::FixedTable(serializer)
            } else {
                FieldKind::VariableTable(serializer)
            }
        } else if let Some(count) = parsed.count.filter(|&c| c > 0 && parsed.base != "char") {
            FieldKind::FixedArray {
                element: FieldDecoder::for_type(&parsed, props)?,
                count,
            }
        } else if VECTOR_TYPES.contains(&parsed.base.as_str()) {
            let element = match &parsed.generic {
                Some(generic) => FieldDecoder::for_type(generic, props)?,
                None => FieldDecoder::Unsigned32,
            };
            FieldKind::VariableArray { element }
        } else {
            FieldKind::Simple(FieldDecoder::for_type(&parsed, props)?)
        };
        Ok(Self::new(name, var_type, kind))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn var_type(&self) -> &str {
        &self.var_type
    }

    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    #[must_use]
    pub const fn model(&self) -> FieldModel {
        match self.kind {
            FieldKind::Simple(_) => FieldModel::Simple,
            FieldKind::FixedArray { .. } => FieldModel::FixedArray,
            FieldKind::VariableArray { .. } => FieldModel::VariableArray,
            FieldKind::FixedTable(_) => FieldModel::FixedTable,
            FieldKind::VariableTable(_) => FieldModel::VariableTable,
        }
    }

    /// Nested serializer for table fields.
    #[must_use]
    pub fn serializer(&self) -> Option<&Rc<Serializer>> {
        match &self.kind {
            FieldKind::FixedTable(s) | FieldKind::VariableTable(s) => Some(s),
            _ => None,
        }
    }

    /// `pos` is the path position just below this field.
    fn decoder_at(&self, path: FieldPath, pos: usize) -> SchemaResult<FieldDecoder> {
        let last = path.last_position();
        match &self.kind {
            FieldKind::Simple(decoder) | FieldKind::FixedArray { element: decoder, .. } => {
                Ok(*decoder)
            }
            FieldKind::VariableArray { element } => Ok(if last == pos {
                *element
            } else {
                FieldDecoder::Unsigned32
            }),
            FieldKind::FixedTable(serializer) => {
                if last + 1 == pos {
                    Ok(FieldDecoder::Bool)
                } else {
                    serializer.decoder_at(path, pos)
                }
            }
            FieldKind::VariableTable(serializer) => {
                if last > pos {
                    serializer.decoder_at(path, pos + 1)
                } else {
                    Ok(FieldDecoder::Unsigned32)
                }
            }
        }
    }

    fn names_at(&self, path: FieldPath, pos: usize, out: &mut Vec<String>) -> SchemaResult<()> {
        out.push(self.name.clone());
        let last = path.last_position();
        match &self.kind {
            FieldKind::Simple(_) => {}
            FieldKind::FixedArray { .. } | FieldKind::VariableArray { .. } => {
                if last == pos {
                    if let Some(index) = path.get(pos) {
                        out.push(format!("{index:04}"));
                    }
                }
            }
            FieldKind::FixedTable(serializer) => {
                if last >= pos {
                    serializer.names_at(path, pos, out)?;
                }
            }
            FieldKind::VariableTable(serializer) => {
                if last >= pos {
                    if let Some(index) = path.get(pos) {
                        out.push(format!("{index:04}"));
                    }
                    if last > pos {
                        serializer.names_at(path, pos + 1, out)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// An ordered, versioned list of fields.
#[derive(Debug)]
pub struct Serializer {
    name: String,
    version: i32,
    fields: Vec<Rc<Field>>,
    decoders: RefCell<HashMap<FieldPath, FieldDecoder>>,
}

impl Serializer {
    #[must_use]
    pub fn new(name: impl Into<String>, version: i32, fields: Vec<Rc<Field>>) -> Self {
        Self {
            name: name.into(),
            version,
            fields,
            decoders: RefCell::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn version(&self) -> i32 {
        self.version
    }

    #[must_use]
    pub fn fields(&self) -> &[Rc<Field>] {
        &self.fields
    }

    /// Finds the decoder for the value a field path addresses.
    ///
    /// Results are memoized per path.
    pub fn resolve_decoder(&self, path: FieldPath) -> SchemaResult<FieldDecoder> {
        if let Some(decoder) = self.decoders.borrow().get(&path) {
            return Ok(*decoder);
        }
        let decoder = self.decoder_at(path, 0)?;
        self.decoders.borrow_mut().insert(path, decoder);
        Ok(decoder)
    }

    /// Number of memoized decoder lookups.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.decoders.borrow().len()
    }

    /// Dotted property name for a field path, such as
    /// `m_vecItems.0002.m_iCount`.
    pub fn name_for_field_path(&self, path: FieldPath) -> SchemaResult<String> {
        let mut parts = Vec::with_capacity(path.len());
        self.names_at(path, 0, &mut parts)?;
        Ok(parts.join("."))
    }

    fn field_at(&self, path: FieldPath, pos: usize) -> SchemaResult<&Field> {
        path.get(pos)
            .and_then(|index| self.fields.get(index))
            .map(|field| &**field)
            .ok_or_else(|| SchemaError::UnresolvedFieldPath {
                serializer: self.name.clone(),
                path: path.to_string(),
            })
    }

    fn decoder_at(&self, path: FieldPath, pos: usize) -> SchemaResult<FieldDecoder> {
        self.field_at(path, pos)?.decoder_at(path, pos + 1)
    }

    fn names_at(&self, path: FieldPath, pos: usize, out: &mut Vec<String>) -> SchemaResult<()> {
        self.field_at(path, pos)?.names_at(path, pos + 1, out)
    }
}
