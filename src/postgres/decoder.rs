use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use super::parsers::type_parser;
use super::reader::ByteReader;
use super::types::{
    ChangeEvent, ColumnInfo, FieldValue, RelationInfo, ReplicaIdentity, Tuple, TypeInfo, WalFrame,
};
use crate::{Error, Result};

/// Stateful decoder for the `pgoutput` logical replication stream.
///
/// Relations and custom types are cached by OID for the lifetime of the
/// decoder; the server sends each relation before the first tuple that
/// references it and re-sends it on schema change. Events carry an
/// [`Arc`] snapshot of the relation current at decode time, so a re-sent
/// relation replaces the cache entry without touching earlier events.
pub struct PgOutputDecoder {
    relations: HashMap<u32, Arc<RelationInfo>>,
    types: HashMap<u32, TypeInfo>,
}

impl Default for PgOutputDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PgOutputDecoder {
    pub fn new() -> Self {
        Self {
            relations: HashMap::new(),
            types: HashMap::new(),
        }
    }

    /// Decodes one `CopyData` payload: a keepalive or a WAL-data envelope.
    pub fn decode_frame(&mut self, data: &[u8]) -> Result<WalFrame> {
        self.decode_frame_inner(data).map_err(at_decoder_boundary)
    }

    fn decode_frame_inner(&mut self, data: &[u8]) -> Result<WalFrame> {
        let mut reader = ByteReader::new(data);
        match reader.read_u8()? {
            b'k' => {
                let current_lsn = reader.read_lsn()?;
                let system_time = reader.read_timestamp()?;
                let should_respond = reader.read_u8()? == 1;
                trace!(%current_lsn, should_respond, "keepalive");
                Ok(WalFrame::Keepalive {
                    current_lsn,
                    system_time,
                    should_respond,
                })
            }
            b'w' => {
                let message_lsn = reader.read_lsn()?;
                let current_lsn = reader.read_lsn()?;
                let system_time = reader.read_timestamp()?;
                let change = self.decode_change(reader.remaining())?;
                Ok(WalFrame::WalData {
                    message_lsn,
                    current_lsn,
                    system_time,
                    change,
                })
            }
            other => Err(Error::Protocol(format!(
                "unexpected replication frame tag '{}'",
                other as char
            ))),
        }
    }

    /// Decodes one `pgoutput` message. The payload must contain exactly one
    /// message; trailing bytes are rejected.
    pub fn decode_change(&mut self, data: &[u8]) -> Result<ChangeEvent> {
        let mut reader = ByteReader::new(data);
        let event = self
            .decode_message(&mut reader)
            .map_err(at_decoder_boundary)?;
        if !reader.is_empty() {
            return Err(Error::Protocol(format!(
                "{} trailing bytes after {} message",
                reader.remaining().len(),
                event.kind()
            )));
        }
        Ok(event)
    }

    fn decode_message(&mut self, reader: &mut ByteReader<'_>) -> Result<ChangeEvent> {
        match reader.read_u8()? {
            b'B' => self.decode_begin(reader),
            b'C' => self.decode_commit(reader),
            b'O' => self.decode_origin(reader),
            b'Y' => self.decode_type(reader),
            b'R' => self.decode_relation(reader),
            b'I' => self.decode_insert(reader),
            b'U' => self.decode_update(reader),
            b'D' => self.decode_delete(reader),
            b'T' => self.decode_truncate(reader),
            b'M' => self.decode_logical_message(reader),
            other => Err(Error::Protocol(format!(
                "unexpected pgoutput message tag '{}'",
                other as char
            ))),
        }
    }

    fn decode_begin(&mut self, reader: &mut ByteReader<'_>) -> Result<ChangeEvent> {
        let commit_lsn = reader.read_lsn()?;
        let commit_time = reader.read_timestamp()?;
        let xid = reader.read_u32()?;
        trace!(%commit_lsn, xid, "BEGIN");
        Ok(ChangeEvent::Begin {
            commit_lsn,
            commit_time,
            xid,
        })
    }

    fn decode_commit(&mut self, reader: &mut ByteReader<'_>) -> Result<ChangeEvent> {
        let flags = reader.read_u8()?;
        let commit_lsn = reader.read_lsn()?;
        let end_lsn = reader.read_lsn()?;
        let commit_time = reader.read_timestamp()?;
        trace!(%commit_lsn, %end_lsn, "COMMIT");
        Ok(ChangeEvent::Commit {
            flags,
            commit_lsn,
            end_lsn,
            commit_time,
        })
    }

    fn decode_origin(&mut self, reader: &mut ByteReader<'_>) -> Result<ChangeEvent> {
        let lsn = reader.read_lsn()?;
        let name = reader.read_cstring()?;
        Ok(ChangeEvent::Origin { lsn, name })
    }

    fn decode_type(&mut self, reader: &mut ByteReader<'_>) -> Result<ChangeEvent> {
        let info = TypeInfo {
            oid: reader.read_u32()?,
            schema: reader.read_cstring()?,
            name: reader.read_cstring()?,
        };
        debug!(oid = info.oid, schema = %info.schema, name = %info.name, "TYPE");
        self.types.insert(info.oid, info.clone());
        Ok(ChangeEvent::Type(info))
    }

    fn decode_relation(&mut self, reader: &mut ByteReader<'_>) -> Result<ChangeEvent> {
        let id = reader.read_u32()?;
        let schema = reader.read_cstring()?;
        let name = reader.read_cstring()?;
        let replica_identity = ReplicaIdentity::from_wire(reader.read_u8()?)?;
        let column_count = reader.read_i16()?;
        if column_count < 0 {
            return Err(Error::Protocol(format!(
                "negative column count {column_count} in relation {schema}.{name}"
            )));
        }

        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let flags = reader.read_u8()?;
            let column_name = reader.read_cstring()?;
            let type_oid = reader.read_u32()?;
            let type_modifier = reader.read_i32()?;

            // Custom types announced before this relation enrich the column;
            // a type message arriving later does not retroactively fill in
            // relations already decoded.
            let (type_schema, type_name) = match self.types.get(&type_oid) {
                Some(t) => (Some(t.schema.clone()), Some(t.name.clone())),
                None => (None, None),
            };

            columns.push(ColumnInfo {
                name: column_name,
                type_oid,
                type_modifier,
                is_key: flags & 1 == 1,
                type_schema,
                type_name,
                parser: type_parser(type_oid),
            });
        }

        let relation = Arc::new(RelationInfo {
            id,
            schema,
            name,
            replica_identity,
            columns,
        });
        debug!(oid = id, "RELATION {}.{}", relation.schema, relation.name);
        self.relations.insert(id, Arc::clone(&relation));
        Ok(ChangeEvent::Relation(relation))
    }

    fn decode_insert(&mut self, reader: &mut ByteReader<'_>) -> Result<ChangeEvent> {
        let relation = self.relation(reader.read_u32()?)?;
        expect_marker(reader, b'N', "INSERT")?;
        let new = read_tuple(reader, &relation, None)?;
        Ok(ChangeEvent::Insert { relation, new })
    }

    fn decode_update(&mut self, reader: &mut ByteReader<'_>) -> Result<ChangeEvent> {
        let relation = self.relation(reader.read_u32()?)?;
        match reader.read_u8()? {
            b'K' => {
                let key = project_key(&relation, read_tuple(reader, &relation, None)?);
                expect_marker(reader, b'N', "UPDATE")?;
                let new = read_tuple(reader, &relation, None)?;
                Ok(ChangeEvent::Update {
                    relation,
                    key: Some(key),
                    old: None,
                    new,
                })
            }
            b'O' => {
                let old = read_tuple(reader, &relation, None)?;
                expect_marker(reader, b'N', "UPDATE")?;
                let new = read_tuple(reader, &relation, Some(&old))?;
                Ok(ChangeEvent::Update {
                    relation,
                    key: None,
                    old: Some(old),
                    new,
                })
            }
            b'N' => {
                let new = read_tuple(reader, &relation, None)?;
                Ok(ChangeEvent::Update {
                    relation,
                    key: None,
                    old: None,
                    new,
                })
            }
            other => Err(Error::Protocol(format!(
                "unexpected UPDATE submessage '{}'",
                other as char
            ))),
        }
    }

    fn decode_delete(&mut self, reader: &mut ByteReader<'_>) -> Result<ChangeEvent> {
        let relation = self.relation(reader.read_u32()?)?;
        match reader.read_u8()? {
            b'K' => {
                let key = project_key(&relation, read_tuple(reader, &relation, None)?);
                Ok(ChangeEvent::Delete {
                    relation,
                    key: Some(key),
                    old: None,
                })
            }
            b'O' => {
                let old = read_tuple(reader, &relation, None)?;
                Ok(ChangeEvent::Delete {
                    relation,
                    key: None,
                    old: Some(old),
                })
            }
            other => Err(Error::Protocol(format!(
                "unexpected DELETE submessage '{}'",
                other as char
            ))),
        }
    }

    fn decode_truncate(&mut self, reader: &mut ByteReader<'_>) -> Result<ChangeEvent> {
        let relation_count = reader.read_i32()?;
        if relation_count < 0 {
            return Err(Error::Protocol(format!(
                "negative relation count {relation_count} in TRUNCATE"
            )));
        }
        let flags = reader.read_u8()?;

        let mut relations = Vec::with_capacity(relation_count as usize);
        for _ in 0..relation_count {
            relations.push(self.relation(reader.read_u32()?)?);
        }

        Ok(ChangeEvent::Truncate {
            relations,
            cascade: flags & 1 != 0,
            restart_identity: flags & 2 != 0,
        })
    }

    fn decode_logical_message(&mut self, reader: &mut ByteReader<'_>) -> Result<ChangeEvent> {
        let flags = reader.read_u8()?;
        let lsn = reader.read_lsn()?;
        let prefix = reader.read_cstring()?;
        let len = reader.read_i32()?;
        if len < 0 {
            return Err(Error::Protocol(format!("negative message length {len}")));
        }
        let content = Bytes::copy_from_slice(reader.read_bytes(len as usize)?);
        Ok(ChangeEvent::Message {
            flags,
            transactional: flags & 1 != 0,
            lsn,
            prefix,
            content,
        })
    }

    fn relation(&self, oid: u32) -> Result<Arc<RelationInfo>> {
        self.relations
            .get(&oid)
            .cloned()
            .ok_or_else(|| Error::Protocol(format!("unknown relation OID: {oid}")))
    }
}

/// Wraps reader underruns into protocol errors; a truncated frame is a
/// grammar violation from the decoder's point of view.
fn at_decoder_boundary(error: Error) -> Error {
    match error {
        Error::OutOfBounds { .. } => Error::Protocol(format!("truncated replication frame: {error}")),
        other => other,
    }
}

fn expect_marker(reader: &mut ByteReader<'_>, expected: u8, context: &str) -> Result<()> {
    let marker = reader.read_u8()?;
    if marker != expected {
        return Err(Error::Protocol(format!(
            "unexpected tuple marker '{}' in {context}",
            marker as char
        )));
    }
    Ok(())
}

/// Reads one tuple. Field count must match the relation's column count.
///
/// Unchanged TOAST fields (`u`) take their value from `fallback` when one is
/// supplied (the old tuple of an `O` update); with no fallback the field is
/// left out of the tuple entirely.
fn read_tuple(
    reader: &mut ByteReader<'_>,
    relation: &RelationInfo,
    fallback: Option<&Tuple>,
) -> Result<Tuple> {
    let field_count = reader.read_i16()?;
    if field_count as usize != relation.columns.len() {
        return Err(Error::Protocol(format!(
            "tuple field count {field_count} does not match {}.{} column count {}",
            relation.schema,
            relation.name,
            relation.columns.len()
        )));
    }

    let mut tuple = Tuple::new();
    for column in &relation.columns {
        match reader.read_u8()? {
            b'n' => tuple.insert(column.name.clone(), FieldValue::Null),
            b't' => {
                let text = reader.read_length_prefixed_string()?;
                tuple.insert(column.name.clone(), FieldValue::Value((column.parser)(&text)));
            }
            b'b' => {
                let len = reader.read_i32()?;
                if len < 0 {
                    return Err(Error::Protocol(format!("negative field length {len}")));
                }
                let raw = Bytes::copy_from_slice(reader.read_bytes(len as usize)?);
                tuple.insert(column.name.clone(), FieldValue::Binary(raw));
            }
            b'u' => {
                if let Some(value) = fallback.and_then(|t| t.get(&column.name)) {
                    tuple.insert(column.name.clone(), value.clone());
                }
            }
            other => {
                return Err(Error::Protocol(format!(
                    "unknown tuple field kind '{}'",
                    other as char
                )))
            }
        }
    }
    Ok(tuple)
}

/// Projects a key tuple down to the relation's key columns. NULLs in a key
/// tuple are placeholders for non-key columns and are dropped.
fn project_key(relation: &RelationInfo, tuple: Tuple) -> Tuple {
    let mut key = Tuple::new();
    for column in relation.columns.iter().filter(|c| c.is_key) {
        match tuple.get(&column.name) {
            Some(FieldValue::Null) | None => {}
            Some(value) => key.insert(column.name.clone(), value.clone()),
        }
    }
    key
}
