pub mod command;
pub mod error;
pub mod frame;
pub mod link;
#[cfg(test)]
pub mod mock_link;
pub mod response;
pub mod tool;
