/// Anything that advances by discrete time units and has no need to reach
/// sibling hardware state to do so.
pub trait Component {
    /// Advance one T-cycle. Returns true if a "significant event" occurred
    /// (e.g. TIMA overflow, instruction boundary).
    fn tick(&mut self) -> bool;
}
