//! Record decoder that always holds the next outcome in hand.
//!
//! The upstream tokenizer is read one record ahead, at construction and after
//! every successful [`RecordDecoder::decode`], so [`RecordDecoder::has_more`]
//! never touches the input.

use std::{io::Read, mem};

use csv::StringRecord;

use crate::{
    error::{Error, Result},
    io_utils,
};

pub type Record = Vec<String>;

#[derive(Debug)]
enum State {
    Ready(Record),
    Exhausted,
    Failed(csv::Error),
}

pub struct RecordDecoder<R> {
    reader: csv::Reader<R>,
    state: State,
}

impl<R: Read> RecordDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self::from_csv(io_utils::open_csv_reader(reader, io_utils::DEFAULT_DELIMITER))
    }

    /// Wraps an already configured tokenizer. It must not treat the first row as a header.
    pub fn from_csv(reader: csv::Reader<R>) -> Self {
        let mut decoder = Self {
            reader,
            state: State::Exhausted,
        };
        decoder.state = decoder.prefetch();
        decoder
    }

    fn prefetch(&mut self) -> State {
        let mut record = StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(true) => State::Ready(record.iter().map(str::to_owned).collect()),
            Ok(false) => State::Exhausted,
            Err(err) => State::Failed(err),
        }
    }

    /// True while a record or an unreported error is waiting.
    pub fn has_more(&self) -> bool {
        !matches!(self.state, State::Exhausted)
    }

    pub fn peek(&self) -> Option<&Record> {
        match &self.state {
            State::Ready(record) => Some(record),
            _ => None,
        }
    }

    /// Returns the next record, `Ok(None)` at end of input.
    ///
    /// A tokenizer error is returned once; the decoder is exhausted afterwards.
    pub fn decode(&mut self) -> Result<Option<Record>> {
        match mem::replace(&mut self.state, State::Exhausted) {
            State::Ready(record) => {
                self.state = self.prefetch();
                Ok(Some(record))
            }
            State::Exhausted => Ok(None),
            State::Failed(err) => Err(Error::Tokenize(err)),
        }
    }
}

impl<R: Read> Iterator for RecordDecoder<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decode().transpose()
    }
}
