pub mod attempt;
pub mod health;
pub mod system;
