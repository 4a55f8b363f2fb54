use std::time::{Duration, Instant};

use lantern::server::timer::TimerList;

fn order<T: Copy>(list: &TimerList<T>) -> Vec<T> {
    list.iter().copied().collect()
}

#[test]
fn test_add_keeps_ascending_order() {
    let base = Instant::now();
    let mut list = TimerList::new();

    list.add_timer(base + Duration::from_secs(5), 5);
    list.add_timer(base + Duration::from_secs(1), 1);
    list.add_timer(base + Duration::from_secs(3), 3);
    list.add_timer(base + Duration::from_secs(4), 4);
    list.add_timer(base + Duration::from_secs(2), 2);

    assert_eq!(order(&list), vec![1, 2, 3, 4, 5]);
    assert_eq!(list.len(), 5);
}

#[test]
fn test_equal_expirations_fire_in_insertion_order() {
    let at = Instant::now();
    let mut list = TimerList::new();

    list.add_timer(at, "a");
    list.add_timer(at, "b");
    list.add_timer(at, "c");

    assert_eq!(order(&list), vec!["a", "b", "c"]);
}

#[test]
fn test_adjust_later_moves_towards_tail() {
    let base = Instant::now();
    let t1 = base + Duration::from_secs(1);
    let t2 = base + Duration::from_secs(2);
    let t3 = base + Duration::from_secs(3);

    let mut list = TimerList::new();
    let first = list.add_timer(t1, 1);
    list.add_timer(t2, 2);
    list.add_timer(t3, 3);

    assert!(list.adjust_timer(first, t3 + Duration::from_secs(1)));

    assert_eq!(order(&list), vec![2, 3, 1]);
    assert_eq!(list.next_expire(), Some(t2));
    assert_eq!(list.expire_of(first), Some(t3 + Duration::from_secs(1)));
}

#[test]
fn test_adjust_earlier_moves_towards_head() {
    let base = Instant::now();
    let mut list = TimerList::new();

    list.add_timer(base + Duration::from_secs(2), 2);
    list.add_timer(base + Duration::from_secs(3), 3);
    let last = list.add_timer(base + Duration::from_secs(4), 4);

    assert!(list.adjust_timer(last, base + Duration::from_secs(1)));
    assert_eq!(order(&list), vec![4, 2, 3]);
}

#[test]
fn test_adjust_within_neighbours_keeps_position() {
    let base = Instant::now();
    let mut list = TimerList::new();

    list.add_timer(base + Duration::from_secs(1), 1);
    let middle = list.add_timer(base + Duration::from_secs(3), 2);
    list.add_timer(base + Duration::from_secs(5), 3);

    assert!(list.adjust_timer(middle, base + Duration::from_secs(4)));
    assert_eq!(order(&list), vec![1, 2, 3]);
    assert!(list.adjust_timer(middle, base + Duration::from_secs(2)));
    assert_eq!(order(&list), vec![1, 2, 3]);
}

#[test]
fn test_tick_fires_expired_prefix_only() {
    let base = Instant::now();
    let t1 = base + Duration::from_secs(1);
    let t2 = base + Duration::from_secs(2);
    let t3 = base + Duration::from_secs(3);

    let mut list = TimerList::new();
    list.add_timer(t3, 3);
    list.add_timer(t1, 1);
    list.add_timer(t2, 2);

    let mut fired = Vec::new();
    list.tick(t2, |data| fired.push(data));

    assert_eq!(fired, vec![1, 2]);
    assert_eq!(order(&list), vec![3]);
    assert_eq!(list.len(), 1);

    fired.clear();
    list.tick(t2, |data| fired.push(data));
    assert!(fired.is_empty());

    list.tick(t3, |data| fired.push(data));
    assert_eq!(fired, vec![3]);
    assert!(list.is_empty());
    assert_eq!(list.next_expire(), None);
}

#[test]
fn test_tick_on_empty_list() {
    let mut list: TimerList<u32> = TimerList::new();
    let mut fired = 0;
    list.tick(Instant::now(), |_| fired += 1);
    assert_eq!(fired, 0);
}

#[test]
fn test_del_timer_unlinks_any_position() {
    let base = Instant::now();
    let mut list = TimerList::new();

    let a = list.add_timer(base + Duration::from_secs(1), 'a');
    let b = list.add_timer(base + Duration::from_secs(2), 'b');
    let c = list.add_timer(base + Duration::from_secs(3), 'c');

    assert_eq!(list.del_timer(b), Some('b'));
    assert_eq!(order(&list), vec!['a', 'c']);

    assert_eq!(list.del_timer(a), Some('a'));
    assert_eq!(order(&list), vec!['c']);

    assert_eq!(list.del_timer(c), Some('c'));
    assert!(list.is_empty());
    assert_eq!(list.iter().count(), 0);
}

#[test]
fn test_stale_id_is_ignored() {
    let base = Instant::now();
    let mut list = TimerList::new();

    let id = list.add_timer(base, 1);
    assert_eq!(list.del_timer(id), Some(1));

    assert_eq!(list.del_timer(id), None);
    assert!(!list.adjust_timer(id, base + Duration::from_secs(1)));
    assert_eq!(list.expire_of(id), None);
}

#[test]
fn test_list_is_reusable_after_draining() {
    let base = Instant::now();
    let mut list = TimerList::new();

    for i in 0..10 {
        list.add_timer(base + Duration::from_millis(i), i);
    }
    list.tick(base + Duration::from_secs(1), |_| {});
    assert!(list.is_empty());

    list.add_timer(base + Duration::from_secs(2), 20);
    list.add_timer(base + Duration::from_secs(1), 10);
    assert_eq!(order(&list), vec![10, 20]);
}
