pub mod attempt_dto;
