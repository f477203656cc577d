pub mod mimetype;
