//! Shared plumbing for the user directory crates: logging bootstrap,
//! runtime environment checks and small wire types.

pub mod types;
pub mod utils;
pub mod env;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_type_up() {
        let h = types::Health::up();
        assert_eq!(h.status, "up");
    }
}
