pub mod form;
pub mod session;
pub mod state;
#[cfg(test)]
pub mod testing;
