//! Rebuilds the reply structure around a trigger message.
//!
//! The recent channel window is merged with every message reachable through
//! reply references, then rendered as an indented tree in which every
//! collected message appears exactly once.

use anyhow::Result;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

use super::connection::{ChatConnection, ChatMessage};

#[derive(Debug, Clone, Copy)]
pub struct GraphLimits {
    /// Messages read from the channel before the trigger.
    pub window: u8,
    /// Longest reply chain followed from any collected message.
    pub max_depth: usize,
    /// Upper bound on single-message fetches for one reconstruction.
    pub max_fetches: usize,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self {
            window: 20,
            max_depth: 10,
            max_fetches: 50,
        }
    }
}

/// Collect the window plus referenced ancestors, deduplicated and sorted
/// chronologically.
pub async fn reconstruct(
    conn: &dyn ChatConnection,
    trigger: &ChatMessage,
    limits: GraphLimits,
) -> Result<Vec<ChatMessage>> {
    let window = conn
        .history(trigger.channel_id, Some(trigger.id), limits.window)
        .await?;

    let mut collected: HashMap<u64, ChatMessage> = HashMap::new();
    for msg in window.into_iter().chain(std::iter::once(trigger.clone())) {
        collected.entry(msg.id).or_insert(msg);
    }

    let mut worklist: VecDeque<(u64, usize)> = collected
        .values()
        .filter_map(|m| m.reference_id.map(|r| (r, 1)))
        .collect();
    let mut visited: HashSet<u64> = collected.keys().copied().collect();
    let mut fetches = 0usize;

    while let Some((id, depth)) = worklist.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        if depth > limits.max_depth {
            debug!("Reply chain depth cap hit at message {}", id);
            continue;
        }
        if fetches >= limits.max_fetches {
            debug!("Fetch cap of {} reached; stopping chase", limits.max_fetches);
            break;
        }
        fetches += 1;

        match conn.fetch(trigger.channel_id, id).await {
            Ok(Some(parent)) => {
                if let Some(grandparent) = parent.reference_id {
                    worklist.push_back((grandparent, depth + 1));
                }
                collected.insert(parent.id, parent);
            }
            Ok(None) => debug!("Referenced message {} is gone", id),
            Err(e) => warn!("Could not fetch referenced message {}: {}", id, e),
        }
    }

    let mut messages: Vec<ChatMessage> = collected.into_values().collect();
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(messages)
}

/// Render messages (already sorted) as an indented reply tree. A message
/// whose parent is not in the set starts a new root.
pub fn render_tree(messages: &[ChatMessage]) -> String {
    let index: HashMap<u64, usize> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id, i))
        .collect();

    let parent_of = |i: usize| -> Option<usize> {
        let msg = &messages[i];
        msg.reference_id
            .filter(|r| *r != msg.id)
            .and_then(|r| index.get(&r).copied())
    };

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); messages.len()];
    for i in 0..messages.len() {
        if let Some(p) = parent_of(i) {
            children[p].push(i);
        }
    }

    let roots = (0..messages.len()).filter(|&i| parent_of(i).is_none());
    let mut visited = vec![false; messages.len()];
    let mut lines = Vec::with_capacity(messages.len());

    // Nodes left over after the real roots sit on a reference cycle; each
    // leftover is promoted to a root so nothing is dropped.
    let starts: Vec<usize> = roots.chain(0..messages.len()).collect();
    for start in starts {
        if visited[start] {
            continue;
        }
        let mut stack = vec![(start, 0usize)];
        while let Some((i, depth)) = stack.pop() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            lines.push(render_line(&messages[i], depth));
            for &child in children[i].iter().rev() {
                if !visited[child] {
                    stack.push((child, depth + 1));
                }
            }
        }
    }

    lines.join("\n")
}

fn render_line(msg: &ChatMessage, depth: usize) -> String {
    format!(
        "{}{} ({}): {}",
        "  ".repeat(depth),
        msg.author.name,
        msg.created_at.format("%Y-%m-%d %H:%M:%S"),
        msg.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::discord::testing::{FakeConnection, message};

    #[tokio::test]
    async fn chases_references_outside_the_window() {
        let conn = FakeConnection::new();
        // 1 <- 2 <- 30 (trigger); 2 and 1 fall outside a window of 2
        conn.insert(message(1, "alice", "root question", 0, None));
        conn.insert(message(2, "bob", "answer", 1, Some(1)));
        for id in 3..=20 {
            conn.insert(message(id, "noise", "chatter", 2 + id as u32, None));
        }
        let trigger = message(30, "carol", "follow-up", 40, Some(2));
        conn.insert(trigger.clone());

        let limits = GraphLimits {
            window: 2,
            ..Default::default()
        };
        let messages = reconstruct(&conn, &trigger, limits).await.unwrap();
        let ids: Vec<u64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 19, 20, 30]);

        let rendered = render_tree(&messages);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "alice (2025-03-09 12:00:00): root question");
        assert_eq!(lines[1], "  bob (2025-03-09 12:01:00): answer");
        assert_eq!(lines[2], "    carol (2025-03-09 12:40:00): follow-up");
        assert!(lines[3].starts_with("noise"));
    }

    #[tokio::test]
    async fn fetch_cap_bounds_the_chase() {
        let conn = FakeConnection::new();
        conn.insert(message(1, "a", "m1", 0, None));
        for id in 2..=10 {
            conn.insert(message(id, "a", "m", id as u32, Some(id - 1)));
        }
        let trigger = message(50, "t", "go", 30, Some(10));
        let limits = GraphLimits {
            window: 0,
            max_depth: 100,
            max_fetches: 3,
        };
        let messages = reconstruct(&conn, &trigger, limits).await.unwrap();
        assert_eq!(conn.fetches.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(messages.len(), 4);
        // The oldest fetched message points at something never fetched.
        assert_eq!(render_tree(&messages).lines().next().unwrap().trim_start(), "a (2025-03-09 12:08:00): m");
    }

    #[tokio::test]
    async fn depth_cap_stops_long_chains() {
        let conn = FakeConnection::new();
        conn.insert(message(1, "a", "m1", 0, None));
        for id in 2..=10 {
            conn.insert(message(id, "a", "m", id as u32, Some(id - 1)));
        }
        let trigger = message(50, "t", "go", 30, Some(10));
        let limits = GraphLimits {
            window: 0,
            max_depth: 2,
            max_fetches: 100,
        };
        let messages = reconstruct(&conn, &trigger, limits).await.unwrap();
        let ids: Vec<u64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![9, 10, 50]);
    }

    #[tokio::test]
    async fn missing_parent_becomes_root() {
        let conn = FakeConnection::new();
        let trigger = message(5, "t", "reply to deleted", 3, Some(4));
        let messages = reconstruct(&conn, &trigger, GraphLimits::default())
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            render_tree(&messages),
            "t (2025-03-09 12:03:00): reply to deleted"
        );
    }

    #[test]
    fn every_message_rendered_once_even_with_cycles() {
        let messages = vec![
            message(1, "a", "one", 0, Some(2)),
            message(2, "b", "two", 1, Some(1)),
            message(3, "c", "self", 2, Some(3)),
            message(4, "d", "child of self", 3, Some(3)),
        ];
        let rendered = render_tree(&messages);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "c (2025-03-09 12:02:00): self");
        assert_eq!(lines[1], "  d (2025-03-09 12:03:00): child of self");
        assert_eq!(lines[2], "a (2025-03-09 12:00:00): one");
        assert_eq!(lines[3], "  b (2025-03-09 12:01:00): two");
    }

    #[test]
    fn siblings_keep_chronological_order() {
        let messages = vec![
            message(1, "root", "q", 0, None),
            message(2, "x", "first", 1, Some(1)),
            message(3, "y", "second", 2, Some(1)),
            message(4, "z", "nested", 3, Some(2)),
        ];
        let rendered = render_tree(&messages);
        let names: Vec<&str> = rendered
            .lines()
            .map(|l| l.trim_start().split(' ').next().unwrap())
            .collect();
        assert_eq!(names, vec!["root", "x", "z", "y"]);
    }
}
