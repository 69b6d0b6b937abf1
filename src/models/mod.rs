pub mod answer;
pub mod assessment;
pub mod attempt;
pub mod question;
pub mod reset;
pub mod result;
