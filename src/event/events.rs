use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-identity key used to file subscriptions and route events
///
/// Two topics are equal when they name the same Rust type. The type name is
/// carried along only for logs and error messages.
#[derive(Clone, Copy)]
pub struct Topic {
    id: TypeId,
    name: &'static str,
}

impl Topic {
    /// The topic of type `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name, e.g. `my_app::events::PlayerJoined`
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl PartialEq for Topic {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Topic {}

impl Hash for Topic {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.name)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Anything that can be published on an [`EventBus`](super::EventBus)
///
/// Events represent facts about things that have already happened. They are
/// handed to listeners by shared reference and are never mutated during
/// dispatch.
///
/// An event type may declare supertypes through [`Event::lineage`]: listeners
/// subscribed to any of those supertypes also receive the event, viewed as
/// the supertype value it embeds.
///
/// ```
/// use kawa::{Event, Lineage};
///
/// struct RoomEvent { room_id: String }
/// impl Event for RoomEvent {}
///
/// struct PlayerJoined { room: RoomEvent, player: String }
/// impl Event for PlayerJoined {
///     fn lineage() -> Lineage<Self> {
///         Lineage::root().extends(|e: &PlayerJoined| &e.room)
///     }
/// }
/// ```
pub trait Event: Send + Sync + 'static {
    /// Whether a listener may stop propagation of this event
    const CANCELLABLE: bool = false;

    /// Supertypes this event is also delivered as, nearest first
    fn lineage() -> Lineage<Self>
    where
        Self: Sized,
    {
        Lineage::root()
    }
}

/// Type-erased view from an event to one of its supertypes
pub(crate) type Projection =
    Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync>;

fn projection<F>(f: F) -> Projection
where
    F: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One resolved supertype of an event type
#[derive(Clone)]
pub(crate) struct Ancestor {
    pub(crate) topic: Topic,
    pub(crate) project: Projection,
}

impl fmt::Debug for Ancestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ancestor")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Declared supertypes of an event type
///
/// Built with [`Lineage::root`] and [`Lineage::extends`]. Extending a
/// supertype also pulls in that supertype's own lineage, so resolution is
/// transitive. Repeated topics (diamonds) keep their first, nearest
/// position.
pub struct Lineage<E> {
    ancestors: Vec<Ancestor>,
    _event: PhantomData<fn(&E)>,
}

impl<E: Event> Lineage<E> {
    /// An empty lineage: the event is delivered only to its own topic
    pub fn root() -> Self {
        Self {
            ancestors: Vec::new(),
            _event: PhantomData,
        }
    }

    /// Declare `P` as a supertype, reachable through `project`
    pub fn extends<P: Event>(mut self, project: fn(&E) -> &P) -> Self {
        let direct = projection(move |event: &dyn Any| {
            event
                .downcast_ref::<E>()
                .map(|event| project(event) as &dyn Any)
        });
        self.push(Topic::of::<P>(), Arc::clone(&direct));

        for ancestor in P::lineage().ancestors {
            let outer = Arc::clone(&direct);
            let inner = ancestor.project;
            self.push(
                ancestor.topic,
                projection(move |event: &dyn Any| outer(event).and_then(|parent| inner(parent))),
            );
        }
        self
    }

    /// Supertype topics in resolution order
    pub fn topics(&self) -> impl Iterator<Item = Topic> + '_ {
        self.ancestors.iter().map(|ancestor| ancestor.topic)
    }

    pub fn len(&self) -> usize {
        self.ancestors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ancestors.is_empty()
    }

    pub(crate) fn into_ancestors(self) -> Vec<Ancestor> {
        self.ancestors
    }

    fn push(&mut self, topic: Topic, project: Projection) {
        if topic == Topic::of::<E>() || self.ancestors.iter().any(|a| a.topic == topic) {
            return;
        }
        self.ancestors.push(Ancestor { topic, project });
    }
}

impl<E: Event> Default for Lineage<E> {
    fn default() -> Self {
        Self::root()
    }
}

impl<E> fmt::Debug for Lineage<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.ancestors.iter().map(|a| a.topic))
            .finish()
    }
}
