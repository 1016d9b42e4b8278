mod formatter;
mod plain;

pub(crate) use formatter::{CheckFormatter, RunFormatter};
pub(crate) use plain::PlainTextFormatter;
