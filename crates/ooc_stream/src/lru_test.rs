use rand::prelude::*;

use super::*;

fn keys<V>(list: &LruList<V>) -> Vec<BlockId> {
  list.iter_lru_to_mru().map(|(k, _)| k).collect()
}

#[test]
fn test_push_orders_lru_to_mru() {
  let mut list = LruList::new();
  list.push_mru(1, "a");
  list.push_mru(2, "b");
  list.push_mru(3, "c");

  assert_eq!(keys(&list), vec![1, 2, 3]);
  assert_eq!(list.peek_lru(), Some(1));
  assert_eq!(list.len(), 3);
}

#[test]
fn test_touch_moves_to_mru() {
  let mut list = LruList::new();
  for k in 0..4 {
    list.push_mru(k, k * 10);
  }

  assert!(list.touch(0));
  assert_eq!(keys(&list), vec![1, 2, 3, 0]);
  assert!(list.touch(2));
  assert_eq!(keys(&list), vec![1, 3, 0, 2]);
  // Touching the tail is a no-op
  assert!(list.touch(2));
  assert_eq!(keys(&list), vec![1, 3, 0, 2]);
  assert!(!list.touch(99));
}

#[test]
fn test_push_existing_replaces_and_touches() {
  let mut list = LruList::new();
  list.push_mru(1, 10);
  list.push_mru(2, 20);

  assert_eq!(list.push_mru(1, 11), Some(10));
  assert_eq!(keys(&list), vec![2, 1]);
  assert_eq!(list.get(1), Some(&11));
  assert_eq!(list.len(), 2);
}

#[test]
fn test_remove_middle_head_tail() {
  let mut list = LruList::new();
  for k in 0..5 {
    list.push_mru(k, k);
  }

  assert_eq!(list.remove(2), Some(2));
  assert_eq!(keys(&list), vec![0, 1, 3, 4]);
  assert_eq!(list.remove(0), Some(0));
  assert_eq!(keys(&list), vec![1, 3, 4]);
  assert_eq!(list.remove(4), Some(4));
  assert_eq!(keys(&list), vec![1, 3]);
  assert_eq!(list.remove(4), None);
  assert!(!list.contains(4));
}

#[test]
fn test_pop_lru_drains_in_order() {
  let mut list = LruList::new();
  list.push_mru(7, ());
  list.push_mru(3, ());
  list.push_mru(5, ());
  list.touch(7);

  assert_eq!(list.pop_lru().map(|(k, _)| k), Some(3));
  assert_eq!(list.pop_lru().map(|(k, _)| k), Some(5));
  assert_eq!(list.pop_lru().map(|(k, _)| k), Some(7));
  assert!(list.pop_lru().is_none());
  assert!(list.is_empty());
  assert_eq!(list.peek_lru(), None);
}

#[test]
fn test_arena_stays_dense() {
  let mut list = LruList::with_capacity(3);
  for round in 0..100u32 {
    list.push_mru(round, round);
    if round % 3 == 0 {
      list.touch(round.saturating_sub(1));
    }
    if list.len() > 3 {
      list.pop_lru();
    }
    assert_eq!(list.nodes.len(), list.len());
    for (key, value) in list.iter_lru_to_mru() {
      assert_eq!(key, *value);
      assert_eq!(list.get(key), Some(value));
    }
  }
  assert_eq!(list.len(), 3);
}

#[test]
fn test_get_or_try_insert_with() {
  let mut list: LruList<u32> = LruList::new();
  list.push_mru(1, 10);
  list.push_mru(2, 20);

  // Existing key: no construction, moves to MRU
  let v = list
    .get_or_try_insert_with(1, || Err::<u32, ()>(()))
    .unwrap();
  assert_eq!(*v, 10);
  assert_eq!(keys(&list), vec![2, 1]);

  // Failing constructor leaves the list untouched
  assert!(list.get_or_try_insert_with(3, || Err::<u32, &str>("boom")).is_err());
  assert_eq!(keys(&list), vec![2, 1]);

  *list.get_or_try_insert_with(3, || Ok::<u32, ()>(30)).unwrap() += 1;
  assert_eq!(keys(&list), vec![2, 1, 3]);
  assert_eq!(list.get(3), Some(&31));
}

#[test]
fn test_get_mut_keeps_recency() {
  let mut list = LruList::new();
  list.push_mru(1, 1);
  list.push_mru(2, 2);
  *list.get_mut(1).unwrap() += 100;
  assert_eq!(keys(&list), vec![1, 2]);
  assert_eq!(list.get(1), Some(&101));
}

/// Random operations checked against a `Vec` model.
#[test]
fn test_matches_vec_model() {
  let mut rng = StdRng::seed_from_u64(7);
  let mut list = LruList::new();
  let mut model: Vec<BlockId> = Vec::new();

  for _ in 0..2000 {
    let key = rng.random_range(0..32);
    match rng.random_range(0..4) {
      0 => {
        list.push_mru(key, key);
        model.retain(|&k| k != key);
        model.push(key);
      }
      1 => {
        let touched = list.touch(key);
        assert_eq!(touched, model.contains(&key));
        if touched {
          model.retain(|&k| k != key);
          model.push(key);
        }
      }
      2 => {
        let removed = list.remove(key);
        assert_eq!(removed.is_some(), model.contains(&key));
        model.retain(|&k| k != key);
      }
      _ => {
        let popped = list.pop_lru().map(|(k, _)| k);
        let expected = if model.is_empty() {
          None
        } else {
          Some(model.remove(0))
        };
        assert_eq!(popped, expected);
      }
    }
    assert_eq!(keys(&list), model);
  }
}
