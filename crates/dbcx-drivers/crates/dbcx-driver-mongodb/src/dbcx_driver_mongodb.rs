//! MongoDB provider
//!
//! Statement text is never evaluated. It is parsed into a [`MongoCommand`]:
//! either a raw command document passed to `runCommand`, or a shell-shaped
//! collection call such as `db.orders.find({"status": "open"}).limit(20)`
//! whose arguments must be strict or extended JSON.

mod command;
mod connection;
mod provider;
mod schema;

#[cfg(test)]
mod command_tests;
#[cfg(test)]
mod connection_tests;

pub use command::{CollectionOp, CommandError, FindOptions, MongoCommand, parse_command};
pub use connection::{DEFAULT_DATABASE, bson_to_value, build_connection_string};
pub use provider::MongoProvider;
