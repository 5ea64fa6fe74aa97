//! Record assembly: header names zipped with a record's cells, resolved to
//! schema fields, decoded and checked for required fields.

use std::{
    collections::HashMap,
    io::{self, Read},
};

use log::debug;

use crate::{
    decode::decode_field,
    error::{Error, Result},
    io_utils,
    record::{Record, RecordDecoder},
    schema::{FieldSpec, Schema},
    split::{Left, Right, split},
    validate::validate,
    value::DynamicMessage,
};

/// Cells keyed by header name. A repeated header name keeps its last cell.
#[derive(Debug, Default)]
pub struct RawFieldMap {
    cells: HashMap<String, String>,
    order: Vec<String>,
}

impl RawFieldMap {
    pub fn zip(header: &[String], record: &[String]) -> Self {
        let mut map = RawFieldMap::default();
        for (name, cell) in header.iter().zip(record) {
            if map.cells.insert(name.clone(), cell.clone()).is_none() {
                map.order.push(name.clone());
            }
        }
        map
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Takes the cell for `field`, accepting either spelling.
    ///
    /// When both spellings are present the alternate one wins and both are removed.
    pub fn consume(&mut self, field: &FieldSpec) -> Option<String> {
        let alternate = field.alternate_name();
        let primary = self.cells.remove(&field.name);
        let alternate = if alternate == field.name {
            None
        } else {
            self.cells.remove(&*alternate)
        };
        alternate.or(primary)
    }

    /// Names still unconsumed, in header order.
    pub fn remaining(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| self.cells.contains_key(name.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Configurable conversion from CSV records to messages.
#[derive(Debug, Clone)]
pub struct Unmarshaler<'s> {
    schema: &'s Schema,
    allow_unknown_fields: bool,
    header: Option<Vec<String>>,
    delimiter: u8,
}

impl<'s> Unmarshaler<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            allow_unknown_fields: false,
            header: None,
            delimiter: io_utils::DEFAULT_DELIMITER,
        }
    }

    /// Drop unknown columns instead of failing on them.
    pub fn allow_unknown_fields(mut self, allow: bool) -> Self {
        self.allow_unknown_fields = allow;
        self
    }

    /// Use a fixed header instead of reading one from the input.
    pub fn with_header(mut self, header: Vec<String>) -> Self {
        self.header = Some(header);
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// Decodes one record into `target` without checking required fields.
    pub fn assemble(
        &self,
        header: &[String],
        record: &[String],
        target: &mut DynamicMessage,
    ) -> Result<()> {
        let message_type = target.message_type().to_string();
        let descriptor = self.schema.message(&message_type).ok_or_else(|| {
            Error::InvalidTarget(format!("message type '{message_type}' is not declared"))
        })?;
        let mut cells = RawFieldMap::zip(header, record);

        for field in descriptor.plain_fields() {
            let Some(raw) = cells.consume(field) else {
                continue;
            };
            match decode_field(&raw, field, self.schema)? {
                Some(value) => target.set(field.name.clone(), value),
                None => {
                    target.clear(&field.name);
                }
            }
        }

        if !cells.is_empty() {
            let mut claimed: Vec<&str> = Vec::new();
            for field in descriptor.oneof_fields() {
                let Some(group) = field.oneof.as_deref() else {
                    continue;
                };
                if claimed.contains(&group) {
                    continue;
                }
                let Some(raw) = cells.consume(field) else {
                    continue;
                };
                claimed.push(group);
                if let Some(value) = decode_field(&raw, field, self.schema)? {
                    target.set_oneof(group, field.name.clone(), value);
                }
            }
        }

        let leftover = cells.remaining();
        if let Some(first) = leftover.first() {
            if !self.allow_unknown_fields {
                return Err(Error::UnknownField {
                    field: first.to_string(),
                    message: message_type,
                });
            }
            debug!("Dropping unknown field(s) {leftover:?} for {message_type}");
        }
        Ok(())
    }

    /// Assembles `record` against the configured header and validates the result.
    pub fn unmarshal_record(&self, record: &[String], target: &mut DynamicMessage) -> Result<()> {
        let header = self.header.as_deref().ok_or_else(|| {
            Error::InvalidTarget("no header configured for record decoding".to_string())
        })?;
        self.assemble(header, record, target)?;
        validate(self.schema, target)
    }

    /// Decodes the next record from `decoder`. Returns `false` at end of input.
    pub fn unmarshal_next<R: Read>(
        &self,
        decoder: &mut RecordDecoder<R>,
        target: &mut DynamicMessage,
    ) -> Result<bool> {
        match decoder.decode()? {
            Some(record) => {
                self.unmarshal_record(&record, target)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Decodes the first record of `reader`, reading a header line first when
    /// none is configured. Input without a data record is an end-of-input
    /// tokenizer error.
    pub fn unmarshal<R: Read>(&self, reader: R, target: &mut DynamicMessage) -> Result<()> {
        let mut csv_reader = io_utils::open_csv_reader(reader, self.delimiter);
        let configured = match &self.header {
            Some(_) => self.clone(),
            None => {
                let header = io_utils::read_single_record(&mut csv_reader)?
                    .ok_or_else(end_of_input)?;
                self.clone().with_header(header)
            }
        };
        let mut decoder = RecordDecoder::from_csv(csv_reader);
        if configured.unmarshal_next(&mut decoder, target)? {
            Ok(())
        } else {
            Err(end_of_input())
        }
    }

    pub fn unmarshal_str(&self, text: &str, target: &mut DynamicMessage) -> Result<()> {
        self.unmarshal(text.as_bytes(), target)
    }

    /// Streams every record of `source` as a `message_type` message.
    ///
    /// The header is the first line of `source` unless one is configured. The
    /// header line ends at the first newline, so header names cannot contain
    /// quoted line breaks.
    pub fn stream<R: Read>(&self, source: R, message_type: &str) -> Result<MessageStream<'s, R>> {
        if self.schema.message(message_type).is_none() {
            return Err(Error::InvalidTarget(format!(
                "message type '{message_type}' is not declared"
            )));
        }
        let (unmarshaler, body) = match &self.header {
            Some(_) => (self.clone(), Body::Whole(source)),
            None => {
                let (left, right) = split(source, io_utils::RECORD_SEPARATOR);
                let header = self.read_header(left)?;
                (self.clone().with_header(header), Body::Tail(right))
            }
        };
        debug!(
            "Streaming {message_type} with header {:?}",
            unmarshaler.header().unwrap_or_default()
        );
        let decoder = RecordDecoder::from_csv(io_utils::open_csv_reader(body, self.delimiter));
        Ok(MessageStream {
            unmarshaler,
            message_type: message_type.to_string(),
            decoder,
        })
    }

    fn read_header<R: Read>(&self, left: Left<R>) -> Result<Record> {
        let mut reader = io_utils::open_csv_reader(left, self.delimiter);
        let header = io_utils::read_single_record(&mut reader)?.unwrap_or_default();
        // Right stays blocked until left reports end of stream.
        let mut left = reader.into_inner();
        io::copy(&mut left, &mut io::sink()).map_err(|err| Error::Tokenize(err.into()))?;
        Ok(header)
    }
}

fn end_of_input() -> Error {
    Error::Tokenize(io::Error::from(io::ErrorKind::UnexpectedEof).into())
}

/// Body bytes of a stream: everything after the header line, or the whole
/// source when the header came from configuration.
pub enum Body<R> {
    Tail(Right<R>),
    Whole(R),
}

impl<R: Read> Read for Body<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Body::Tail(right) => right.read(buf),
            Body::Whole(source) => source.read(buf),
        }
    }
}

/// Iterator over validated messages decoded from one stream.
pub struct MessageStream<'s, R> {
    unmarshaler: Unmarshaler<'s>,
    message_type: String,
    decoder: RecordDecoder<Body<R>>,
}

impl<'s, R: Read> MessageStream<'s, R> {
    pub fn header(&self) -> &[String] {
        self.unmarshaler.header().unwrap_or_default()
    }

    pub fn has_more(&self) -> bool {
        self.decoder.has_more()
    }
}

impl<'s, R: Read> Iterator for MessageStream<'s, R> {
    type Item = Result<DynamicMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut target = DynamicMessage::new(self.message_type.clone());
        match self.unmarshaler.unmarshal_next(&mut self.decoder, &mut target) {
            Ok(true) => Some(Ok(target)),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
