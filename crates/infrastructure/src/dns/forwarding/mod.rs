pub mod message_builder;
pub mod request_parser;
pub mod response_parser;

pub use message_builder::MessageBuilder;
pub use request_parser::RequestParser;
pub use response_parser::ResponseParser;
