// Release stack - reverse-order destruction of GPU objects
//
// Every successful create pushes its matching destroy. Popping runs them
// last-in first-out, which is the order the API requires. Dropping a
// half-built stack releases only what was actually created.

/// LIFO list of pending destroy calls.
#[derive(Default)]
pub struct ReleaseStack {
    entries: Vec<Entry>,
}

struct Entry {
    label: &'static str,
    release: Box<dyn FnOnce()>,
}

impl ReleaseStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the destroy call for an object that was just created.
    pub fn push(&mut self, label: &'static str, release: impl FnOnce() + 'static) {
        self.entries.push(Entry {
            label,
            release: Box::new(release),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every pending destroy call, newest first.
    pub fn release_all(&mut self) {
        while let Some(entry) = self.entries.pop() {
            log::debug!("Releasing {}", entry.label);
            (entry.release)();
        }
    }
}

impl Drop for ReleaseStack {
    fn drop(&mut self) {
        if !self.is_empty() {
            log::debug!("Releasing {} objects left on a dropped stack", self.len());
            self.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &'static str| -> Box<dyn FnOnce()> {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn releases_in_reverse_creation_order() {
        let (log, make) = recorder();
        let mut stack = ReleaseStack::new();
        for name in ["instance", "surface", "device", "swapchain", "image view"] {
            stack.push(name, make(name));
        }

        stack.release_all();

        assert_eq!(
            *log.borrow(),
            vec!["image view", "swapchain", "device", "surface", "instance"]
        );
        assert!(stack.is_empty());
    }

    #[test]
    fn drop_releases_a_partial_build() {
        let (log, make) = recorder();
        {
            let mut stack = ReleaseStack::new();
            stack.push("instance", make("instance"));
            stack.push("surface", make("surface"));
            assert_eq!(stack.len(), 2);
            // Creation of the device "fails" here; the stack goes out of scope.
        }

        assert_eq!(*log.borrow(), vec!["surface", "instance"]);
    }

    #[test]
    fn each_entry_runs_once() {
        let (log, make) = recorder();
        let mut stack = ReleaseStack::new();
        stack.push("fence", make("fence"));

        stack.release_all();
        stack.release_all();
        drop(stack);

        assert_eq!(*log.borrow(), vec!["fence"]);
    }
}
