use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Parser error")]
    ParserError(#[from] crate::parser::ParserError),
    #[error("Controller error")]
    ControllerError(#[from] crate::ControllerError),
    #[error("Simulation error")]
    SimulationError(#[from] crate::SimulationError),
    #[error("Failed to write output")]
    OutputError(#[from] std::io::Error),
}
