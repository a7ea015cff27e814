mod model;

pub use model::Transaction;
