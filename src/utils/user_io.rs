use rustyline::{error::ReadlineError, Editor};
use std::{any::Any, error::Error, str::FromStr};

pub type BoxError = Box<dyn Error + Send + Sync>;
pub type BoxResult<T> = Result<T, BoxError>;

/// Turns the result of `JoinHandle::join` into a `BoxResult`, keeping the
/// panic message when there is one.
pub trait BoxErr<T> {
    fn box_err(self) -> BoxResult<T>;
}

impl<T> BoxErr<T> for std::thread::Result<T> {
    fn box_err(self) -> BoxResult<T> {
        self.map_err(|payload| RaisedError::new(&panic_message(payload)))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("thread panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("thread panicked: {}", msg)
    } else {
        String::from("thread panicked")
    }
}

#[derive(Debug)]
pub struct RaisedError {
    msg: String,
}

impl RaisedError {
    pub fn new(msg: &str) -> BoxError {
        Box::new(Self {
            msg: String::from(msg),
        })
    }
}

impl std::fmt::Display for RaisedError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl Error for RaisedError {}

pub enum ReadAndParseUserEntryRes<T>
where
    T: FromStr,
{
    Ok(T),
    EmptyEntry,
    ParseErr {
        e: <T as FromStr>::Err,
        user_entry: String,
    },
    ReadErr(ReadlineError),
}

pub fn parse_user_entry<T>(user_entry: String) -> ReadAndParseUserEntryRes<T>
where
    T: FromStr,
{
    let trimmed = user_entry.trim();
    if trimmed.is_empty() {
        ReadAndParseUserEntryRes::EmptyEntry
    } else {
        match trimmed.parse::<T>() {
            Ok(e) => ReadAndParseUserEntryRes::Ok(e),
            Err(e) => ReadAndParseUserEntryRes::ParseErr { e, user_entry },
        }
    }
}

pub fn read_and_parse_user_entry<T>(msg: &str) -> ReadAndParseUserEntryRes<T>
where
    T: FromStr,
{
    let mut editor = Editor::<()>::new();
    match editor.readline(&format!("{}: ", msg)) {
        Ok(user_entry) => parse_user_entry(user_entry),
        Err(e) => ReadAndParseUserEntryRes::ReadErr(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn parse_entry_variants() {
        assert!(matches!(
            parse_user_entry::<usize>(" 2 ".into()),
            ReadAndParseUserEntryRes::Ok(2)
        ));
        assert!(matches!(
            parse_user_entry::<usize>("".into()),
            ReadAndParseUserEntryRes::EmptyEntry
        ));
        match parse_user_entry::<usize>("two".into()) {
            ReadAndParseUserEntryRes::ParseErr { user_entry, .. } => assert_eq!(user_entry, "two"),
            _ => panic!("expected a parse error"),
        }
    }

    #[test]
    fn join_panic_becomes_error() {
        let res = thread::spawn(|| -> u8 { panic!("boom") }).join().box_err();
        let e = res.unwrap_err();
        assert_eq!(e.to_string(), "thread panicked: boom");
    }

    #[test]
    fn join_ok_passes_through() {
        let res = thread::spawn(|| 7u8).join().box_err();
        assert_eq!(res.unwrap(), 7);
    }
}
