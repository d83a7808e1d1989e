use pmem_hal::CopyFault;
use pmem_paging::WalkError;

/// Everything that can go wrong with the rogue page.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, thiserror::Error)]
pub enum PmemError {
    #[error("rogue page is not initialized")]
    NotInitialized,
    #[error("rogue page is already initialized")]
    AlreadyInitialized,
    /// The paging structures around the rogue page have an unexpected shape.
    #[error("unsupported paging structure")]
    Unsupported,
    #[error("address is not mapped")]
    NotMapped,
    /// The physical address is out of range or backs a live paging table.
    #[error("physical address rejected")]
    InvalidAddress,
    /// A copy faulted, or the rogue PTE was modified behind the manager's back.
    #[error("memory fault")]
    Fault,
    #[error("transfer ended early")]
    PartialTransfer,
    #[error("transfer cancelled")]
    Cancelled,
    #[error("no virtual page could be reserved")]
    ReservationFailed,
}

impl From<WalkError> for PmemError {
    fn from(e: WalkError) -> Self {
        match e {
            // Reserved bits in an entry make the CPU fault too: no translation.
            WalkError::NonCanonical { .. } | WalkError::NotMapped { .. } | WalkError::Malformed { .. } => {
                Self::NotMapped
            }
            WalkError::LargePage { .. } => Self::Unsupported,
        }
    }
}

impl From<CopyFault> for PmemError {
    fn from(_: CopyFault) -> Self {
        Self::Fault
    }
}

/// A transfer stopped before the end of the request.
///
/// `transferred` bytes at the start of the request were moved; nothing after
/// them was touched.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("transfer stopped after {transferred} bytes")]
pub struct TransferError {
    pub transferred: usize,
    #[source]
    pub cause: PmemError,
}

impl TransferError {
    #[must_use]
    pub const fn new(transferred: usize, cause: PmemError) -> Self {
        Self { transferred, cause }
    }

    /// Summary for callers that only report one status.
    ///
    /// Copy faults are always [`PmemError::Fault`]. Any other failure is
    /// [`PmemError::PartialTransfer`] once bytes have moved, and the
    /// underlying cause otherwise.
    #[must_use]
    pub const fn kind(&self) -> PmemError {
        match self.cause {
            PmemError::Fault => PmemError::Fault,
            cause if self.transferred == 0 => cause,
            _ => PmemError::PartialTransfer,
        }
    }
}
