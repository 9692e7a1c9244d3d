/// A participant in a transaction.
///
/// The coordinator calls `prepare` on every participant before committing any
/// of them when more than one is enlisted. A participant that returns an error
/// from `prepare` or `commit` causes the remaining participants to be rolled
/// back. `rollback` must not fail; a participant that cannot undo its work
/// logs and gives up.
pub trait TransactionalResource: Send {
    /// Short description used in logs and errors.
    fn describe(&self) -> String;

    fn prepare(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), String>;

    fn rollback(&mut self);
}
