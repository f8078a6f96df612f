//! Wire-format message types and line-oriented (de)serialization.
//!
//! Every broker message body is UTF-8, whitespace-tokenised, one command per
//! delivery. Parsing never panics: a malformed line becomes a [`ParseError`],
//! which the caller logs and acknowledges per the protocol-error handling
//! rules — it never causes the consumer loop to stop.

use std::fmt;

// ---------------------------------------------------------------------------
// ParseError
// ---------------------------------------------------------------------------

/// Why an inbound message body could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The body was empty or all-whitespace.
    Empty,
    /// The first token is not a recognised verb for this queue.
    UnknownVerb(String),
    /// The verb was recognised but the token count is wrong.
    WrongArity { verb: &'static str, got: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty message body"),
            ParseError::UnknownVerb(v) => write!(f, "unknown verb: {v}"),
            ParseError::WrongArity { verb, got } => {
                write!(f, "wrong arity for {verb}: got {got} token(s)")
            }
        }
    }
}

impl std::error::Error for ParseError {}

// ---------------------------------------------------------------------------
// ClientCommand — inbound on C2X
// ---------------------------------------------------------------------------

/// A command received on the client-facing queue (`C2X`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    SignUp { uid: String },
    SignIn { uid: String },
    SignOut { uid: String },
    /// `products` is non-empty and preserves wire order.
    Request { uid: String, products: Vec<String> },
    /// `order_id` is carried as the raw token: it may not be a well-formed
    /// UUID, and attributing the failure back to `uid` is the caller's job.
    Cancel { uid: String, order_id: String },
    View { uid: String },
}

impl ClientCommand {
    pub fn parse(body: &str) -> Result<Self, ParseError> {
        let tokens: Vec<&str> = body.split_whitespace().collect();
        let (verb, rest) = tokens.split_first().ok_or(ParseError::Empty)?;

        match *verb {
            "SIGN_UP" => one_arg(rest, "SIGN_UP").map(|uid| ClientCommand::SignUp { uid }),
            "SIGN_IN" => one_arg(rest, "SIGN_IN").map(|uid| ClientCommand::SignIn { uid }),
            "SIGN_OUT" => one_arg(rest, "SIGN_OUT").map(|uid| ClientCommand::SignOut { uid }),
            "VIEW" => one_arg(rest, "VIEW").map(|uid| ClientCommand::View { uid }),
            "CANCEL" => {
                if rest.len() != 2 {
                    return Err(ParseError::WrongArity {
                        verb: "CANCEL",
                        got: rest.len(),
                    });
                }
                Ok(ClientCommand::Cancel {
                    uid: rest[0].to_string(),
                    order_id: rest[1].to_string(),
                })
            }
            "REQUEST" => {
                if rest.len() < 2 {
                    return Err(ParseError::WrongArity {
                        verb: "REQUEST",
                        got: rest.len(),
                    });
                }
                Ok(ClientCommand::Request {
                    uid: rest[0].to_string(),
                    products: rest[1..].iter().map(|s| s.to_string()).collect(),
                })
            }
            other => Err(ParseError::UnknownVerb(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RobotMessage — inbound on R2X
// ---------------------------------------------------------------------------

/// A message received on the robot-facing queue (`R2X`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotMessage {
    Moved { order_id: String, product: String },
    NotFound { order_id: String, product: String },
}

impl RobotMessage {
    pub fn parse(body: &str) -> Result<Self, ParseError> {
        let tokens: Vec<&str> = body.split_whitespace().collect();
        let (verb, rest) = tokens.split_first().ok_or(ParseError::Empty)?;

        match *verb {
            "MOVED" => two_args(rest, "MOVED")
                .map(|(order_id, product)| RobotMessage::Moved { order_id, product }),
            "NOT_FOUND" => two_args(rest, "NOT_FOUND")
                .map(|(order_id, product)| RobotMessage::NotFound { order_id, product }),
            other => Err(ParseError::UnknownVerb(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// DeliveryMessage — inbound on D2X
// ---------------------------------------------------------------------------

/// A message received on the delivery-facing queue (`D2X`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMessage {
    Delivered { order_id: String },
    DeliveryFailed { order_id: String },
}

impl DeliveryMessage {
    pub fn parse(body: &str) -> Result<Self, ParseError> {
        let tokens: Vec<&str> = body.split_whitespace().collect();
        let (verb, rest) = tokens.split_first().ok_or(ParseError::Empty)?;

        match *verb {
            "DELIVERED" => {
                one_arg(rest, "DELIVERED").map(|order_id| DeliveryMessage::Delivered { order_id })
            }
            "DELIVERY_FAILED" => one_arg(rest, "DELIVERY_FAILED")
                .map(|order_id| DeliveryMessage::DeliveryFailed { order_id }),
            other => Err(ParseError::UnknownVerb(other.to_string())),
        }
    }
}

fn one_arg(rest: &[&str], verb: &'static str) -> Result<String, ParseError> {
    match rest {
        [single] => Ok(single.to_string()),
        _ => Err(ParseError::WrongArity {
            verb,
            got: rest.len(),
        }),
    }
}

fn two_args(rest: &[&str], verb: &'static str) -> Result<(String, String), ParseError> {
    match rest {
        [a, b] => Ok((a.to_string(), b.to_string())),
        _ => Err(ParseError::WrongArity {
            verb,
            got: rest.len(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Outbound message formatting
// ---------------------------------------------------------------------------

/// One line of a `FOUND_REQUESTS` reply: `<order_id> <p1> [<p2> …] <state>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSummaryLine {
    pub order_id: String,
    pub products: Vec<String>,
    pub state: String,
}

impl fmt::Display for OrderSummaryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.order_id)?;
        for p in &self.products {
            write!(f, " {p}")?;
        }
        write!(f, " {}", self.state)
    }
}

/// A message the controller sends back to a specific client on `<GID><user_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientResponse {
    SignedUp,
    SignUpFailed,
    SignedIn,
    SignInFailed,
    SignedOut,
    SignOutFailed,
    RequestCreated { order_id: String, products: Vec<String> },
    /// `order_id` is `None` when the request was rejected before an order
    /// existed (e.g. caller not signed in).
    RequestFailed { order_id: Option<String> },
    Cancelled { order_id: String },
    CancelFailed { order_id: String },
    FoundRequests { lines: Vec<OrderSummaryLine> },
    ViewFailed,
}

impl fmt::Display for ClientResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientResponse::SignedUp => write!(f, "SIGNED_UP"),
            ClientResponse::SignUpFailed => write!(f, "SIGN_UP_FAILED"),
            ClientResponse::SignedIn => write!(f, "SIGNED_IN"),
            ClientResponse::SignInFailed => write!(f, "SIGN_IN_FAILED"),
            ClientResponse::SignedOut => write!(f, "SIGNED_OUT"),
            ClientResponse::SignOutFailed => write!(f, "SIGN_OUT_FAILED"),
            ClientResponse::RequestCreated { order_id, products } => {
                write!(f, "REQUEST_CREATED {order_id}")?;
                for p in products {
                    write!(f, " {p}")?;
                }
                Ok(())
            }
            ClientResponse::RequestFailed { order_id: None } => write!(f, "REQUEST_FAILED"),
            ClientResponse::RequestFailed { order_id: Some(id) } => {
                write!(f, "REQUEST_FAILED {id}")
            }
            ClientResponse::Cancelled { order_id } => write!(f, "CANCELLED {order_id}"),
            ClientResponse::CancelFailed { order_id } => write!(f, "CANCEL_FAILED {order_id}"),
            ClientResponse::FoundRequests { lines } => {
                write!(f, "FOUND_REQUESTS")?;
                for line in lines {
                    write!(f, "\n{line}")?;
                }
                Ok(())
            }
            ClientResponse::ViewFailed => write!(f, "VIEW_FAILED"),
        }
    }
}

/// A message the controller sends to the robot queue (`X2R`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCommand {
    pub order_id: String,
    pub product: String,
}

impl fmt::Display for MoveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MOVE {} {}", self.order_id, self.product)
    }
}

/// A message the controller sends to the delivery queue (`X2D`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryDispatch {
    pub client_id: String,
    pub order_id: String,
    pub products: Vec<String>,
}

impl fmt::Display for DeliveryDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DELIVERY {} {}", self.client_id, self.order_id)?;
        for p in &self.products {
            write!(f, " {p}")?;
        }
        Ok(())
    }
}
