use rustc_hash::FxHashSet;
use std::rc::Rc;
use std::cell::RefCell;
use std::thread_local;

thread_local! {
    static NAMES: RefCell<FxHashSet<Rc<str>>> = RefCell::new(FxHashSet::default());
}

// Class names, selectors and variable names are interned so that equal names
// share one allocation and hash/compare on the pointer-sized handle.
pub fn name(s: &str) -> Rc<str> {
    NAMES.with(|set| {
        let mut guard = set.borrow_mut();
        if let Some(existing) = guard.get(s) {
            return existing.clone();
        }
        let rc: Rc<str> = Rc::from(s);
        guard.insert(rc.clone());
        rc
    })
}

pub fn name_owned(s: String) -> Rc<str> {
    name(s.as_str())
}

// The arity of a selector is its colon count; `plus:` is 1, `run` is 0,
// `startsWith:endsBefore:` is 2.
pub fn selector_arity(selector: &str) -> usize {
    selector.bytes().filter(|b| *b == b':').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_names_share_identity() {
        let a = name("whileTrue:");
        let b = name("whileTrue:");
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn selector_arity_counts_colons() {
        assert_eq!(selector_arity("run"), 0);
        assert_eq!(selector_arity("plus:"), 1);
        assert_eq!(selector_arity("startsWith:endsBefore:"), 2);
        assert_eq!(selector_arity("ifTrue:ifFalse:"), 2);
    }
}
