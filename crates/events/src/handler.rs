use consignment_core::Aggregate;

/// Decide and evolve in one step, without persistence.
///
/// Runs `handle` and applies every resulting event to the aggregate. Tests use
/// this to drive aggregates directly; production code goes through the
/// dispatcher so the events are stored.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
