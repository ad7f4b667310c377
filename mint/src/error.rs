use thiserror::Error;

#[derive(Error, Debug)]
pub enum MintError {
    #[error("quantity must be between 1 and 20")]
    InvalidQuantity(u32),

    #[error("not enough unclaimed items left")]
    InsufficientInventory,

    #[error("reservation lost a concurrent race, try again")]
    ReservationRace,

    #[error("payment amount collided with an existing session, try again")]
    AmountCollision,

    #[error("malformed row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MintError {
    /// Errors the buyer can act on; everything else is an internal fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MintError::InvalidQuantity(_)
                | MintError::InsufficientInventory
                | MintError::ReservationRace
                | MintError::AmountCollision
        )
    }
}
