//! 组件仓库
//!
//! 组件的唯一所有者。槽位竞技场（arena）按序列号索引，
//! 每个组件类型维护一条贯穿槽位的双向链表以保持插入顺序。
//! 释放的槽位回到空闲池复用，序列号永不复用。
//!
//! 遍历安全协议见 [`ComponentIterator`]：单线程交错变更下
//! 迭代器绝不解引用已释放的槽位。真正的多线程访问需要
//! 读写锁或不可变快照，此处不提供。

use crate::component::{Component, ComponentType, ModelComponent};
use std::collections::HashMap;

/// 链表槽位
#[derive(Debug)]
struct LinkSlot {
    serial_number: u64,
    component_type: ComponentType,
    /// 槽位对组件的独占所有权；空闲槽位为None
    component: Option<Component>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// 每类型链表头尾
#[derive(Debug, Default, Clone, Copy)]
struct TypeList {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

/// 组件仓库
#[derive(Debug, Default)]
pub struct ComponentStore {
    slots: Vec<LinkSlot>,

    /// 空闲槽位池（索引复用，序列号不复用）
    free: Vec<usize>,

    lists: HashMap<ComponentType, TypeList>,

    /// 序列号 -> 槽位，O(1)弱引用解析
    serial_index: HashMap<u64, usize>,

    /// 下一个序列号；从1开始，0保留为"无"
    next_serial: u64,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            lists: HashMap::new(),
            serial_index: HashMap::new(),
            next_serial: 1,
        }
    }

    /// 收入一个组件，分配并返回其序列号
    pub fn insert(&mut self, component: Component) -> u64 {
        let component_type = component.component_type();
        let serial_number = self.next_serial;
        self.next_serial += 1;
        debug_assert!(!self.serial_index.contains_key(&serial_number));

        let list = self.lists.entry(component_type).or_default();
        let prev = list.tail;

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = LinkSlot {
                    serial_number,
                    component_type,
                    component: Some(component),
                    prev,
                    next: None,
                };
                slot
            }
            None => {
                self.slots.push(LinkSlot {
                    serial_number,
                    component_type,
                    component: Some(component),
                    prev,
                    next: None,
                });
                self.slots.len() - 1
            }
        };

        let list = self.lists.get_mut(&component_type).expect("list exists");
        match list.tail {
            Some(tail) => self.slots[tail].next = Some(slot),
            None => list.head = Some(slot),
        }
        list.tail = Some(slot);
        list.len += 1;

        self.serial_index.insert(serial_number, slot);
        serial_number
    }

    /// 移除并取回组件；序列号未注册时为None
    ///
    /// 槽位回到空闲池；该序列号之后永远解析为空。
    pub fn remove(&mut self, serial_number: u64) -> Option<Component> {
        let slot = self.serial_index.remove(&serial_number)?;
        let (component_type, prev, next) = {
            let s = &self.slots[slot];
            (s.component_type, s.prev, s.next)
        };

        match prev {
            Some(prev) => self.slots[prev].next = next,
            None => {
                self.lists
                    .get_mut(&component_type)
                    .expect("list exists")
                    .head = next;
            }
        }
        match next {
            Some(next) => self.slots[next].prev = prev,
            None => {
                self.lists
                    .get_mut(&component_type)
                    .expect("list exists")
                    .tail = prev;
            }
        }
        if let Some(list) = self.lists.get_mut(&component_type) {
            list.len = list.len.saturating_sub(1);
        }

        let removed = self.slots[slot].component.take();
        self.slots[slot].prev = None;
        self.slots[slot].next = None;
        self.free.push(slot);
        removed
    }

    /// 序列号解析（弱引用求值）
    pub fn get(&self, serial_number: u64) -> Option<&Component> {
        let slot = *self.serial_index.get(&serial_number)?;
        self.slots[slot].component.as_ref()
    }

    pub fn get_mut(&mut self, serial_number: u64) -> Option<&mut Component> {
        let slot = *self.serial_index.get(&serial_number)?;
        self.slots[slot].component.as_mut()
    }

    pub fn contains(&self, serial_number: u64) -> bool {
        self.serial_index.contains_key(&serial_number)
    }

    /// 类型内组件数量
    pub fn count(&self, component_type: ComponentType) -> usize {
        self.lists
            .get(&component_type)
            .map(|list| list.len)
            .unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.serial_index.len()
    }

    /// 类型首组件序列号
    pub fn first_serial(&self, component_type: ComponentType) -> Option<u64> {
        let head = self.lists.get(&component_type)?.head?;
        Some(self.slots[head].serial_number)
    }

    /// 类型末组件序列号
    pub fn last_serial(&self, component_type: ComponentType) -> Option<u64> {
        let tail = self.lists.get(&component_type)?.tail?;
        Some(self.slots[tail].serial_number)
    }

    /// 按插入顺序借用遍历（遍历期间借用规则禁止变更）
    pub fn iter_type(
        &self,
        component_type: ComponentType,
    ) -> impl Iterator<Item = &Component> {
        self.iter_type_with_serial(component_type)
            .map(|(_, component)| component)
    }

    /// 遍历某类型的 (序列号, 组件)
    pub fn iter_type_with_serial(
        &self,
        component_type: ComponentType,
    ) -> impl Iterator<Item = (u64, &Component)> {
        BorrowedIter {
            store: self,
            slot: self.lists.get(&component_type).and_then(|list| list.head),
        }
    }

    fn slot_of(&self, serial_number: u64) -> Option<usize> {
        self.serial_index.get(&serial_number).copied()
    }

    fn serial_at(&self, slot: Option<usize>) -> u64 {
        slot.map(|s| self.slots[s].serial_number).unwrap_or(0)
    }
}

struct BorrowedIter<'a> {
    store: &'a ComponentStore,
    slot: Option<usize>,
}

impl<'a> Iterator for BorrowedIter<'a> {
    type Item = (u64, &'a Component);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.slot?;
        let link = &self.store.slots[slot];
        self.slot = link.next;
        link.component
            .as_ref()
            .map(|component| (link.serial_number, component))
    }
}

/// 可跨变更存活的游标式迭代器
///
/// 缓存 (槽位指针, 当前/前/后序列号, 缓存时的内容版本)。
/// 每次推进先比较缓存版本与当前内容版本：
/// - 未变：直接沿缓存槽位的链表指针走（快路径）
/// - 已变（期间发生过任意增删，包括其他类型的表）：改用序列号
///   索引重新解析（慢路径），绝不解引用可能已释放的槽位
///
/// 即"快照或再同步"语义：变更后的下一步稍慢，但始终正确。
#[derive(Debug, Clone)]
pub struct ComponentIterator {
    component_type: ComponentType,
    slot: Option<usize>,
    current_serial: u64,
    next_serial: u64,
    prev_serial: u64,
    cached_version: u64,
    started: bool,
}

impl ComponentIterator {
    pub fn new(component_type: ComponentType) -> Self {
        Self {
            component_type,
            slot: None,
            current_serial: 0,
            next_serial: 0,
            prev_serial: 0,
            cached_version: 0,
            started: false,
        }
    }

    pub fn component_type(&self) -> ComponentType {
        self.component_type
    }

    /// 当前组件的序列号（尚未开始或已结束为0）
    pub fn current_serial(&self) -> u64 {
        self.current_serial
    }

    fn cache(&mut self, store: &ComponentStore, slot: Option<usize>, content_version: u64) {
        self.slot = slot;
        self.current_serial = store.serial_at(slot);
        self.next_serial = store.serial_at(slot.and_then(|s| store.slots[s].next));
        self.prev_serial = store.serial_at(slot.and_then(|s| store.slots[s].prev));
        self.cached_version = content_version;
    }

    /// 定位下一个组件的槽位
    fn advance_slot(
        &self,
        store: &ComponentStore,
        content_version: u64,
        forward: bool,
    ) -> Option<usize> {
        if !self.started {
            return if forward {
                store.lists.get(&self.component_type)?.head
            } else {
                store.lists.get(&self.component_type)?.tail
            };
        }

        if content_version == self.cached_version {
            // 快路径：缓存仍然有效，直接走链表指针
            let slot = self.slot?;
            debug_assert_eq!(store.slots[slot].serial_number, self.current_serial);
            return if forward {
                store.slots[slot].next
            } else {
                store.slots[slot].prev
            };
        }

        // 慢路径：用序列号重新解析。当前组件还在就取它的活链接；
        // 当前组件已被删除则退而求其次，直接定位缓存的邻居。
        if let Some(slot) = store.slot_of(self.current_serial) {
            return if forward {
                store.slots[slot].next
            } else {
                store.slots[slot].prev
            };
        }
        let neighbor = if forward {
            self.next_serial
        } else {
            self.prev_serial
        };
        if neighbor != 0 {
            return store.slot_of(neighbor);
        }
        None
    }

    pub(crate) fn step<'s>(
        &mut self,
        store: &'s ComponentStore,
        content_version: u64,
        forward: bool,
    ) -> Option<&'s Component> {
        let slot = self.advance_slot(store, content_version, forward);
        self.started = true;
        self.cache(store, slot, content_version);
        slot.and_then(|s| store.slots[s].component.as_ref())
    }

    /// 解析当前组件（已被删除时为None）
    pub(crate) fn resolve<'s>(&self, store: &'s ComponentStore) -> Option<&'s Component> {
        store.get(self.current_serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;
    use crate::linetype::LinePattern;

    fn layer(name: &str) -> Component {
        Component::Layer(Layer::new(name))
    }

    #[test]
    fn test_insert_remove_and_order() {
        let mut store = ComponentStore::new();
        let a = store.insert(layer("A"));
        let b = store.insert(layer("B"));
        let c = store.insert(layer("C"));

        assert_eq!(store.count(ComponentType::Layer), 3);
        let names: Vec<_> = store
            .iter_type(ComponentType::Layer)
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, ["A", "B", "C"]);

        // 中间删除保持链表完整
        assert!(store.remove(b).is_some());
        assert!(store.get(b).is_none());
        let names: Vec<_> = store
            .iter_type(ComponentType::Layer)
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, ["A", "C"]);
        assert_eq!(store.first_serial(ComponentType::Layer), Some(a));
        assert_eq!(store.last_serial(ComponentType::Layer), Some(c));
    }

    #[test]
    fn test_serial_numbers_never_reused() {
        let mut store = ComponentStore::new();
        let a = store.insert(layer("A"));
        store.remove(a);

        // 槽位复用，序列号单调
        let b = store.insert(layer("B"));
        assert!(b > a);
        assert!(store.get(a).is_none());
        assert!(store.get(b).is_some());
    }

    #[test]
    fn test_iterator_fast_path() {
        let mut store = ComponentStore::new();
        store.insert(layer("A"));
        store.insert(layer("B"));

        let version = 7;
        let mut it = ComponentIterator::new(ComponentType::Layer);
        assert_eq!(it.step(&store, version, true).unwrap().name(), "A");
        assert_eq!(it.step(&store, version, true).unwrap().name(), "B");
        assert!(it.step(&store, version, true).is_none());
    }

    #[test]
    fn test_iterator_resync_after_unrelated_mutation() {
        let mut store = ComponentStore::new();
        store.insert(layer("A"));
        store.insert(layer("B"));
        store.insert(layer("C"));

        let mut it = ComponentIterator::new(ComponentType::Layer);
        assert_eq!(it.step(&store, 1, true).unwrap().name(), "A");

        // 其他类型表发生变更（内容版本跳动），图层序列不受影响
        let unrelated = store.insert(Component::LinePattern(LinePattern::new(
            "Dashed",
            vec![1.0, -1.0],
        )));
        assert_eq!(it.step(&store, 2, true).unwrap().name(), "B");

        store.remove(unrelated);
        assert_eq!(it.step(&store, 3, true).unwrap().name(), "C");
        assert!(it.step(&store, 3, true).is_none());
    }

    #[test]
    fn test_iterator_resync_after_current_removed() {
        let mut store = ComponentStore::new();
        store.insert(layer("A"));
        let b = store.insert(layer("B"));
        store.insert(layer("C"));

        let mut it = ComponentIterator::new(ComponentType::Layer);
        assert_eq!(it.step(&store, 1, true).unwrap().name(), "A");
        assert_eq!(it.step(&store, 1, true).unwrap().name(), "B");

        // 当前组件被删除：通过缓存的后继序列号继续
        store.remove(b);
        assert!(it.resolve(&store).is_none());
        assert_eq!(it.step(&store, 2, true).unwrap().name(), "C");
        assert!(it.step(&store, 2, true).is_none());
    }

    #[test]
    fn test_iterator_backward() {
        let mut store = ComponentStore::new();
        store.insert(layer("A"));
        store.insert(layer("B"));

        let mut it = ComponentIterator::new(ComponentType::Layer);
        assert_eq!(it.step(&store, 1, false).unwrap().name(), "B");
        assert_eq!(it.step(&store, 1, false).unwrap().name(), "A");
        assert!(it.step(&store, 1, false).is_none());
    }
}
