pub mod hybrid;
pub mod lexical;
pub mod vector;
