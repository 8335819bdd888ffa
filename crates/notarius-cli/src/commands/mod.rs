//! CLI subcommands.

#[expect(
    unreachable_pub,
    reason = "binary crate - pub inside private module is fine"
)]
pub mod inspect;
#[expect(
    unreachable_pub,
    reason = "binary crate - pub inside private module is fine"
)]
pub mod serve;
#[expect(
    unreachable_pub,
    reason = "binary crate - pub inside private module is fine"
)]
pub mod verify;
