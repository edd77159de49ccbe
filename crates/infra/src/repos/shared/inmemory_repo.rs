use std::sync::Mutex;

/// Useful functions for creating inmemory repositories

pub fn insert<T: Clone>(val: &T, collection: &Mutex<Vec<T>>) {
    let mut collection = collection.lock().unwrap();
    collection.push(val.clone());
}

pub fn find_one_by<T: Clone, F: Fn(&T) -> bool>(collection: &Mutex<Vec<T>>, compare: F) -> Option<T> {
    let collection = collection.lock().unwrap();
    collection.iter().find(|item| compare(item)).cloned()
}

pub fn find_by<T: Clone, F: FnMut(&T) -> bool>(
    collection: &Mutex<Vec<T>>,
    mut compare: F,
) -> Vec<T> {
    let collection = collection.lock().unwrap();
    let mut items = Vec::new();
    for item in collection.iter() {
        if compare(item) {
            items.push(item.clone());
        }
    }
    items
}

/// Replaces the first item matching `compare` with `val` when `replace_if`
/// holds for it, or inserts `val` if nothing matches. Returns whether the
/// collection changed.
pub fn upsert_if<T: Clone, F: Fn(&T) -> bool, R: Fn(&T) -> bool>(
    val: &T,
    collection: &Mutex<Vec<T>>,
    compare: F,
    replace_if: R,
) -> bool {
    let mut collection = collection.lock().unwrap();
    match collection.iter().position(|item| compare(item)) {
        Some(index) if replace_if(&collection[index]) => {
            collection[index] = val.clone();
            true
        }
        Some(_) => false,
        None => {
            collection.push(val.clone());
            true
        }
    }
}

/// Replaces the first item matching `compare` when `replace_if` holds for it.
/// Returns whether an item was replaced.
pub fn replace_if<T: Clone, F: Fn(&T) -> bool, R: Fn(&T) -> bool>(
    val: &T,
    collection: &Mutex<Vec<T>>,
    compare: F,
    replace_if: R,
) -> bool {
    let mut collection = collection.lock().unwrap();
    match collection.iter().position(|item| compare(item)) {
        Some(index) if replace_if(&collection[index]) => {
            collection[index] = val.clone();
            true
        }
        _ => false,
    }
}

pub fn delete_by<T: Clone, F: Fn(&T) -> bool>(collection: &Mutex<Vec<T>>, compare: F) -> Vec<T> {
    let mut collection = collection.lock().unwrap();
    let mut deleted_items = Vec::new();
    let mut index = 0;
    while index < collection.len() {
        if compare(&collection[index]) {
            deleted_items.push(collection.remove(index));
        } else {
            index += 1;
        }
    }
    deleted_items
}
