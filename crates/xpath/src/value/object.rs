//! Opaque host values carried through expressions.
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A host object. Converts to its display string; a null object converts to the empty
/// string, NaN and false.
#[derive(Clone)]
pub struct ObjectValue {
    object: Option<Arc<dyn Any + Send + Sync>>,
    display: String,
}

impl ObjectValue {
    pub fn new<T: Any + Send + Sync + fmt::Display>(object: T) -> Self {
        let display = object.to_string();
        Self {
            object: Some(Arc::new(object)),
            display,
        }
    }

    pub fn null() -> Self {
        Self {
            object: None,
            display: String::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.object.is_none()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.object.as_ref().and_then(|o| o.downcast_ref::<T>())
    }

    pub fn as_string(&self) -> &str {
        &self.display
    }

    pub fn as_boolean(&self) -> bool {
        !self.is_null() && !self.display.is_empty()
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        match (&self.object, &other.object) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "ObjectValue(#null#)")
        } else {
            write!(f, "ObjectValue({:?})", self.display)
        }
    }
}
