use std::fmt;

/// Invoker is a reachable, weighted node endpoint used for client-side request routing.
///
/// Equality is (address, weight).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Invoker {
    address: String,
    weight: u32,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InvalidInvokerError {
    #[error("Invoker address must not be empty")]
    EmptyAddress,
    #[error("Invoker address is {0} bytes, longer than the wire limit")]
    AddressTooLong(usize),
}

impl Invoker {
    pub fn new<A: Into<String>>(address: A, weight: u32) -> Result<Self, InvalidInvokerError> {
        let address = address.into();
        if address.is_empty() {
            return Err(InvalidInvokerError::EmptyAddress);
        }
        if address.len() > u16::MAX as usize {
            return Err(InvalidInvokerError::AddressTooLong(address.len()));
        }

        Ok(Invoker { address, weight })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }
}

impl fmt::Display for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(w={})", self.address, self.weight)
    }
}
