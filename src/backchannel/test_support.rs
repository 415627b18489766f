use std::sync::Mutex;

use async_trait::async_trait;

use crate::backchannel::directory::{Directory, Role};
use crate::backchannel::types::{ContainerRef, UserId};

#[derive(Debug, Clone)]
struct UserRec {
    id: UserId,
    handle: String,
    global_owner: bool,
}

#[derive(Debug, Clone)]
struct ContainerRec {
    container: ContainerRef,
    name: String,
    /// The creator for DMs, the founding owner for channels.
    owners: Vec<UserId>,
    /// Everyone, owners included, in join order.
    members: Vec<UserId>,
}

#[derive(Debug, Default)]
struct World {
    users: Vec<UserRec>,
    /// Channels then DMs, each in creation order.
    containers: Vec<ContainerRec>,
}

/// In-memory membership oracle for tests, standing in for the external
/// membership collaborator.
#[derive(Debug, Default)]
pub(crate) struct TestDirectory {
    world: Mutex<World>,
}

impl TestDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_user(&self, id: UserId, handle: &str) {
        self.world.lock().unwrap().users.push(UserRec {
            id,
            handle: handle.to_string(),
            global_owner: false,
        });
    }

    pub(crate) fn set_global_owner(&self, id: UserId) {
        let mut world = self.world.lock().unwrap();
        if let Some(user) = world.users.iter_mut().find(|u| u.id == id) {
            user.global_owner = true;
        }
    }

    pub(crate) fn add_channel(&self, id: u64, name: &str, owner: UserId, members: &[UserId]) {
        let mut all = vec![owner];
        all.extend_from_slice(members);
        self.world.lock().unwrap().containers.push(ContainerRec {
            container: ContainerRef::Channel(id),
            name: name.to_string(),
            owners: vec![owner],
            members: all,
        });
    }

    pub(crate) fn add_dm(&self, id: u64, name: &str, creator: UserId, members: &[UserId]) {
        let mut all = vec![creator];
        all.extend_from_slice(members);
        self.world.lock().unwrap().containers.push(ContainerRec {
            container: ContainerRef::Dm(id),
            name: name.to_string(),
            owners: vec![creator],
            members: all,
        });
    }

    pub(crate) fn join(&self, container: ContainerRef, user: UserId) {
        let mut world = self.world.lock().unwrap();
        if let Some(rec) = world.containers.iter_mut().find(|c| c.container == container) {
            if !rec.members.contains(&user) {
                rec.members.push(user);
            }
        }
    }

    pub(crate) fn remove_container(&self, container: ContainerRef) {
        self.world
            .lock()
            .unwrap()
            .containers
            .retain(|c| c.container != container);
    }

    fn with_container<T>(
        &self,
        container: ContainerRef,
        f: impl FnOnce(&ContainerRec) -> T,
    ) -> Option<T> {
        self.world
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.container == container)
            .map(f)
    }
}

#[async_trait]
impl Directory for TestDirectory {
    async fn container_exists(&self, container: ContainerRef) -> bool {
        self.with_container(container, |_| ()).is_some()
    }

    async fn name_of(&self, container: ContainerRef) -> Option<String> {
        self.with_container(container, |c| c.name.clone())
    }

    async fn is_member(&self, container: ContainerRef, user: UserId) -> bool {
        self.with_container(container, |c| c.members.contains(&user))
            .unwrap_or(false)
    }

    async fn role_of(&self, container: ContainerRef, user: UserId) -> Option<Role> {
        self.with_container(container, |c| {
            if c.owners.contains(&user) {
                Some(Role::Owner)
            } else if c.members.contains(&user) {
                Some(Role::Member)
            } else {
                None
            }
        })
        .flatten()
    }

    async fn is_global_owner(&self, user: UserId) -> bool {
        self.world
            .lock()
            .unwrap()
            .users
            .iter()
            .any(|u| u.id == user && u.global_owner)
    }

    async fn handle_of(&self, user: UserId) -> Option<String> {
        self.world
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.id == user)
            .map(|u| u.handle.clone())
    }

    async fn resolve_handle(&self, container: ContainerRef, handle: &str) -> Option<UserId> {
        let world = self.world.lock().unwrap();
        let rec = world.containers.iter().find(|c| c.container == container)?;
        world
            .users
            .iter()
            .find(|u| u.handle == handle && rec.members.contains(&u.id))
            .map(|u| u.id)
    }

    async fn channels_of(&self, user: UserId) -> Vec<u64> {
        self.world
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|c| c.container.is_channel() && c.members.contains(&user))
            .map(|c| c.container.container_id())
            .collect()
    }

    async fn dms_of(&self, user: UserId) -> Vec<u64> {
        self.world
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|c| !c.container.is_channel() && c.members.contains(&user))
            .map(|c| c.container.container_id())
            .collect()
    }

    async fn registered_users(&self) -> Vec<UserId> {
        self.world
            .lock()
            .unwrap()
            .users
            .iter()
            .map(|u| u.id)
            .collect()
    }
}
