use std::fmt;

/// Step of the two-phase order workflow a message asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderVerb {
    /// Reserve the order in the warehouse.
    Prepare,
    /// Hand the order over to shipping.
    Ship,
}

impl OrderVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderVerb::Prepare => "PREPARE",
            OrderVerb::Ship => "SHIP",
        }
    }
}

impl fmt::Display for OrderVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured form of an order message: `"VERB ORDERID <id>"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderCommand {
    pub verb: OrderVerb,
    pub order_id: String,
}

impl fmt::Display for OrderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ORDERID {}", self.verb, self.order_id)
    }
}

/// A message handed to the broker. The payload is fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    payload: String,
    command: Option<OrderCommand>,
}

impl Message {
    /// An opaque text message.
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            command: None,
        }
    }

    pub fn order(verb: OrderVerb, order_id: impl Into<String>) -> Self {
        let command = OrderCommand {
            verb,
            order_id: order_id.into(),
        };
        Self {
            payload: command.to_string(),
            command: Some(command),
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn order_id(&self) -> Option<&str> {
        self.command.as_ref().map(|c| c.order_id.as_str())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload)
    }
}

/// How the two messages of a transaction are derived from one input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DerivationMode {
    /// The input is sent unmodified to both destinations.
    Literal,
    /// The input is an order id: `PREPARE` to the first destination, `SHIP` to the second.
    #[default]
    Order,
}

/// Derives the (first, second) message pair for one transaction.
pub fn derive_pair(mode: DerivationMode, input: &str) -> (Message, Message) {
    match mode {
        DerivationMode::Literal => (Message::text(input), Message::text(input)),
        DerivationMode::Order => (
            Message::order(OrderVerb::Prepare, input),
            Message::order(OrderVerb::Ship, input),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_pair() {
        let (first, second) = derive_pair(DerivationMode::Order, "42");
        assert_eq!(first.payload(), "PREPARE ORDERID 42");
        assert_eq!(second.payload(), "SHIP ORDERID 42");
        assert_eq!(first.order_id(), Some("42"));
        assert_eq!(second.order_id(), Some("42"));
        assert_eq!(second.to_string(), "SHIP ORDERID 42");
    }

    #[test]
    fn test_literal_pair() {
        let (first, second) = derive_pair(DerivationMode::Literal, "hello world");
        assert_eq!(first, second);
        assert_eq!(first.payload(), "hello world");
        assert_eq!(first.order_id(), None);
    }
}
