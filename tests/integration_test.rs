use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raft_log::{
    Entry, EntryId, Index, LeadSlice, LeaderSnapshot, LogError, LogMark, LogStorage, MemoryStorage,
    RaftLog, Snapshot, Term, NO_LIMIT,
};
use slog::Drain;

/// A replica driving its own log: writes unstable entries to storage synchronously and applies
/// committed entries into a list.
struct Node {
    log: RaftLog<MemoryStorage>,
    applied: Vec<Bytes>,
}

impl Node {
    fn new(name: &str) -> Self {
        let log = RaftLog::new(MemoryStorage::new(), create_root_logger_for_stdout(name.to_string())).unwrap();
        Node {
            log,
            applied: Vec::new(),
        }
    }

    fn propose(&mut self, term: Term, payloads: &[String]) {
        let last = self.log.last_entry_id();
        let entries = payloads
            .iter()
            .enumerate()
            .map(|(i, p)| Entry::new(term, last.index + 1 + i as u64, p.clone()))
            .collect();
        assert!(self.log.append(LeadSlice::new(term, last, entries)).unwrap());
    }

    fn persist(&mut self) {
        let snapshot = self.log.next_unstable_snapshot().cloned();
        let entries = self.log.next_unstable_ents().to_vec();
        let term = self.log.acc_term();
        self.log.accept_unstable();

        if let Some(snapshot) = snapshot {
            let index = snapshot.metadata.index;
            self.log.storage_mut().apply_snapshot(snapshot).unwrap();
            self.log.stable_snap_to(index);
            // The state machine is restored from the snapshot.
            self.log.applied_to(index).unwrap();
        }
        if let Some(last) = entries.last() {
            let mark = LogMark::new(term, last.index);
            self.log.storage_mut().append(&entries).unwrap();
            self.log.stable_to(mark);
        }
    }

    fn apply(&mut self, allow_unstable: bool) {
        loop {
            let batch = self.log.next_committed_ents(allow_unstable).unwrap();
            let last = match batch.last() {
                Some(last) => last.index,
                None => return,
            };
            self.log.accept_applying(last).unwrap();
            self.applied.extend(batch.into_iter().map(|e| e.data));
            self.log.applied_to(last).unwrap();
        }
    }

    fn check_invariants(&self) {
        let log = &self.log;
        assert!(log.applied() <= log.applying(), "{}", log);
        assert!(log.applying() <= log.committed(), "{}", log);
        assert!(log.committed() <= log.last_index(), "{}", log);
        assert!(log.last_entry_id().term <= log.acc_term(), "{}", log);
    }
}

/// Leader-side replication state of one follower.
struct Progress {
    matched: Index,
    next: Index,
}

enum Outcome {
    Accepted,
    Rejected,
    NeedsSnapshot,
}

/// Sends one append from the `term` leader, and handles the follower's response.
fn send_append(leader: &Node, follower: &mut Node, term: Term, pr: &mut Progress, max_size: u64) -> Outcome {
    let prev_index = pr.next - 1;
    let prev_term = match leader.log.term(prev_index) {
        Ok(term) => term,
        Err(LogError::Compacted) => return Outcome::NeedsSnapshot,
        Err(e) => panic!("failed to read term at {}: {}", prev_index, e),
    };
    let entries = match leader.log.entries(prev_index, max_size) {
        Ok(entries) => entries,
        Err(LogError::Compacted) => return Outcome::NeedsSnapshot,
        Err(e) => panic!("failed to read entries after {}: {}", prev_index, e),
    };
    let slice = LeadSlice::new(term, EntryId::new(prev_term, prev_index), entries);
    let last = slice.last_index();

    if follower.log.maybe_append(slice).unwrap() {
        follower.persist();
        let commit = leader.log.committed().min(last);
        follower.log.commit_to(LogMark::new(term, commit)).unwrap();
        pr.matched = pr.matched.max(last);
        pr.next = last + 1;
        return Outcome::Accepted;
    }

    let (hint_index, hint_term) = follower.log.find_conflict_by_term(prev_index, prev_term).unwrap();
    let (next_probe, _) = leader.log.find_conflict_by_term(hint_index, hint_term).unwrap();
    assert!(next_probe < prev_index, "probe must go back [{} -> {}]", prev_index, next_probe);
    pr.next = next_probe + 1;
    Outcome::Rejected
}

/// Replicates until the follower has everything the leader has.
fn catch_up(leader: &Node, follower: &mut Node, term: Term, pr: &mut Progress, max_size: u64) {
    for _ in 0..1000 {
        if let Outcome::NeedsSnapshot = send_append(leader, follower, term, pr, max_size) {
            panic!("unexpected snapshot request at {}", pr.next);
        }
        if pr.matched == leader.log.last_index() {
            return;
        }
    }
    panic!("follower did not catch up: {}", follower.log);
}

/// Commits up to the highest index durable on both nodes, if it's from the leader's term.
fn leader_commit(leader: &mut Node, term: Term, pr: &Progress) {
    let index = pr.matched.min(leader.log.last_index());
    if index > leader.log.committed() && leader.log.term(index).unwrap() == term {
        leader.log.commit_to(LogMark::new(term, index)).unwrap();
    }
}

fn payloads(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}-{}", prefix, i)).collect()
}

fn all_terms(node: &Node) -> Vec<Term> {
    node.log.all_entries().unwrap().iter().map(|e| e.term).collect()
}

#[test]
fn replicate_commit_and_apply() {
    let mut leader = Node::new("leader");
    let mut follower = Node::new("follower");
    let term = 1;

    leader.propose(term, &payloads("a", 10));
    leader.persist();
    assert!(!leader.log.has_next_unstable_ents());

    let mut pr = Progress { matched: 0, next: 1 };
    // Small pages force several round trips.
    catch_up(&leader, &mut follower, term, &mut pr, 8);
    assert_eq!(pr.matched, 10);

    leader_commit(&mut leader, term, &pr);
    assert_eq!(leader.log.committed(), 10);
    leader.apply(false);

    // The follower learns the commit index with the next (empty) append.
    send_append(&leader, &mut follower, term, &mut pr, NO_LIMIT);
    assert_eq!(follower.log.committed(), 10);
    follower.apply(false);

    assert_eq!(leader.applied.len(), 10);
    assert_eq!(leader.applied, follower.applied);
    assert_eq!(follower.log.applied(), 10);
    assert_eq!(all_terms(&follower), vec![1; 10]);
    leader.check_invariants();
    follower.check_invariants();
}

#[test]
fn new_leader_repairs_divergent_follower() {
    let mut a = Node::new("a");
    let mut b = Node::new("b");

    // Term 1: a leads and both nodes get 1..=5, committed.
    a.propose(1, &payloads("t1", 5));
    a.persist();
    let mut pr = Progress { matched: 0, next: 1 };
    catch_up(&a, &mut b, 1, &mut pr, NO_LIMIT);
    leader_commit(&mut a, 1, &pr);
    send_append(&a, &mut b, 1, &mut pr, NO_LIMIT);
    assert_eq!(b.log.committed(), 5);

    // Term 2: a proposes 6..=9 but never gets them out.
    a.propose(2, &payloads("t2", 4));
    a.persist();

    // Term 3: b is elected by the rest of the cluster while a is partitioned away, and writes its
    // own 6..=7. a's log is now behind, despite being longer.
    b.propose(3, &payloads("t3", 2));
    b.persist();
    assert!(!b.log.is_up_to_date(a.log.last_entry_id()));

    // b's first probe is at its own last index, which mismatches a's log.
    let mut pr = Progress {
        matched: 0,
        next: b.log.last_index() + 1,
    };
    match send_append(&b, &mut a, 3, &mut pr, NO_LIMIT) {
        Outcome::Rejected => {}
        _ => panic!("expected the probe at 7 to be rejected"),
    }
    // One round of conflict search lands right at the divergence point.
    assert_eq!(pr.next, 6);

    catch_up(&b, &mut a, 3, &mut pr, NO_LIMIT);
    assert_eq!(a.log.acc_term(), 3);
    assert_eq!(all_terms(&a), vec![1, 1, 1, 1, 1, 3, 3]);
    assert_eq!(a.log.storage().last_index(), 7);

    leader_commit(&mut b, 3, &pr);
    send_append(&b, &mut a, 3, &mut pr, NO_LIMIT);
    a.apply(false);
    b.apply(false);
    assert_eq!(a.applied, b.applied);
    assert_eq!(a.applied.len(), 7);
    a.check_invariants();
    b.check_invariants();
}

#[test]
fn lagging_follower_catches_up_from_snapshot() {
    let mut leader = Node::new("leader");
    let mut follower = Node::new("follower");
    let term = 1;

    // The leader commits 1..=10 on its own, as if other followers formed the quorum.
    leader.propose(term, &payloads("a", 10));
    leader.persist();
    leader.log.commit_to(LogMark::new(term, 10)).unwrap();
    leader.apply(true);
    leader.log.storage_mut().compact(8).unwrap();
    assert_eq!(leader.log.compacted(), 8);

    let mut pr = Progress { matched: 0, next: 1 };
    match send_append(&leader, &mut follower, term, &mut pr, NO_LIMIT) {
        Outcome::NeedsSnapshot => {}
        _ => panic!("entries after 0 are compacted"),
    }

    let snapshot = Snapshot::new(leader.log.term(8).unwrap(), 8, "state@8");
    assert!(follower.log.restore(LeaderSnapshot::new(term, snapshot)));
    assert_eq!(follower.log.committed(), 8);
    assert!(follower.log.has_next_unstable_snapshot());
    // Nothing is appliable before the snapshot is.
    assert!(follower.log.next_committed_span(true).is_empty());

    follower.persist();
    assert!(!follower.log.has_next_or_in_progress_snapshot());
    assert_eq!(follower.log.applied(), 8);
    assert_eq!(follower.log.compacted(), 8);

    pr.next = 9;
    catch_up(&leader, &mut follower, term, &mut pr, NO_LIMIT);
    assert_eq!(follower.log.last_index(), 10);
    assert_eq!(follower.log.committed(), 10);

    follower.apply(false);
    assert_eq!(follower.log.applied(), 10);
    assert_eq!(follower.applied, leader.applied[8..].to_vec());
    follower.check_invariants();
}

#[test]
fn random_leader_changes_preserve_committed_prefix() {
    for seed in 0..20 {
        run_random(seed);
    }
}

fn run_random(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut nodes = [Node::new("n0"), Node::new("n1")];
    let mut leader = 0;
    let mut term = 1;
    let mut pr = Progress { matched: 0, next: 1 };
    let mut proposals = 0;

    for _ in 0..200 {
        let (l, f) = split(&mut nodes, leader);
        match rng.gen_range(0..10) {
            0..=3 => {
                let count = rng.gen_range(1..4);
                let batch = payloads(&format!("s{}-p{}", seed, proposals), count);
                proposals += 1;
                l.propose(term, &batch);
                l.persist();
            }
            4..=6 => {
                let max_size = if rng.gen_bool(0.5) { NO_LIMIT } else { rng.gen_range(1..16) };
                if let Outcome::NeedsSnapshot = send_append(l, f, term, &mut pr, max_size) {
                    panic!("nothing is compacted in this test");
                }
                leader_commit(l, term, &pr);
            }
            7 => {
                l.apply(rng.gen_bool(0.5));
                f.apply(rng.gen_bool(0.5));
            }
            _ => {
                // Election: the candidate needs the other node's vote.
                let candidate = rng.gen_range(0..2);
                let voter = 1 - candidate;
                if nodes[voter].log.is_up_to_date(nodes[candidate].log.last_entry_id()) {
                    term += 1;
                    leader = candidate;
                    let (l, _) = split(&mut nodes, leader);
                    // A new leader starts its term with an empty entry.
                    l.propose(term, &[String::new()]);
                    l.persist();
                    pr = Progress {
                        matched: 0,
                        next: l.log.last_index() + 1,
                    };
                }
            }
        }

        for node in nodes.iter() {
            node.check_invariants();
        }
        check_committed_prefix(&nodes);
    }

    // Quiesce: the last leader brings everyone up to date and commits everything.
    let (l, f) = split(&mut nodes, leader);
    catch_up(l, f, term, &mut pr, NO_LIMIT);
    leader_commit(l, term, &pr);
    send_append(l, f, term, &mut pr, NO_LIMIT);
    l.apply(false);
    f.apply(false);
    assert_eq!(l.log.committed(), l.log.last_index());
    assert_eq!(nodes[0].applied, nodes[1].applied);
    assert_eq!(all_terms(&nodes[0]), all_terms(&nodes[1]));
}

fn split(nodes: &mut [Node; 2], leader: usize) -> (&mut Node, &mut Node) {
    let (first, second) = nodes.split_at_mut(1);
    if leader == 0 {
        (&mut first[0], &mut second[0])
    } else {
        (&mut second[0], &mut first[0])
    }
}

fn check_committed_prefix(nodes: &[Node; 2]) {
    let common = nodes[0].log.committed().min(nodes[1].log.committed());
    for i in 1..=common {
        assert_eq!(nodes[0].log.term(i).unwrap(), nodes[1].log.term(i).unwrap(), "index {}", i);
    }
    let applied = nodes[0].applied.len().min(nodes[1].applied.len());
    assert_eq!(nodes[0].applied[..applied], nodes[1].applied[..applied]);
}

fn create_root_logger_for_stdout(node_id: String) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("NodeId" => node_id))
}
