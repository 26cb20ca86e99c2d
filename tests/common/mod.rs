//! Shared test fixture: an in-memory ISO 9660 image builder.
//!
//! Writes a descriptor set at sector 16, little- and big-endian path
//! tables, and sector-aligned directory extents with real both-endian
//! fields, so the images exercise the same structures a released
//! software image would.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;

use tempfile::NamedTempFile;

pub const SECTOR: usize = 2048;

/// Sector of the Primary Volume Descriptor.
pub const PVD_SECTOR: usize = 16;
/// Sector of the set terminator.
pub const TERMINATOR_SECTOR: usize = 18;
/// Sector of the little-endian path table.
pub const L_TABLE_SECTOR: usize = 19;

const M_TABLE_SECTOR: usize = 20;
const FIRST_EXTENT: u32 = 21;
const DIRECTORY_FLAG: u8 = 0x02;

/// Metadata document placed in the reference tree.
pub const METADATA_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
    <productName>EDGE-OS</productName>
    <version>13.1.0</version>
    <buildNumber>0.0.4</buildNumber>
</metadata>
"#;

/// One node of the tree to bake into an image.
pub enum Node {
    File { name: String, content: Vec<u8> },
    Dir { name: String, children: Vec<Node> },
}

impl Node {
    pub fn file(name: &str, content: &[u8]) -> Node {
        Node::File {
            name: name.to_string(),
            content: content.to_vec(),
        }
    }

    pub fn dir(name: &str, children: Vec<Node>) -> Node {
        Node::Dir {
            name: name.to_string(),
            children,
        }
    }
}

#[derive(Default)]
pub struct BuildOptions {
    /// Directory names to leave out of both path tables. Their subtrees
    /// are left out too, so lookups must walk the directory tree.
    pub omit_from_path_table: Vec<String>,
}

/// The tree most tests use: metadata at the root, an empty file, and a
/// nested configuration directory.
pub fn reference_tree() -> Vec<Node> {
    vec![
        Node::file("METADATA.XML", METADATA_XML.as_bytes()),
        Node::file("EMPTY.TXT", b""),
        Node::dir(
            "CONFIG",
            vec![
                Node::file("HOTFIX.TXT", b"hotfix inventory\n"),
                Node::dir("DEEP", vec![Node::file("NOTES.TXT", b"deep notes\n")]),
            ],
        ),
    ]
}

pub fn build_image(children: Vec<Node>) -> Vec<u8> {
    build_image_with(children, BuildOptions::default())
}

pub fn build_image_with(children: Vec<Node>, options: BuildOptions) -> Vec<u8> {
    let mut dirs = flatten(children);

    let extent_lens: Vec<usize> = (0..dirs.len())
        .map(|index| packed_size(&record_sizes(&dirs[index], &dirs)))
        .collect();

    // Directory extents first, in level order, then file extents.
    let mut next_extent = FIRST_EXTENT;
    let mut dir_extents = vec![0u32; dirs.len()];
    for (index, length) in extent_lens.iter().enumerate() {
        dir_extents[index] = next_extent;
        next_extent += (length / SECTOR) as u32;
    }
    for dir in dirs.iter_mut() {
        for child in dir.children.iter_mut() {
            if let FlatChild::File { content, extent, .. } = child {
                *extent = next_extent;
                next_extent += content.len().div_ceil(SECTOR) as u32;
            }
        }
    }
    let total_sectors = next_extent;

    // Path tables. Omitted directories drop out of the numbering, so
    // positions are re-derived from the surviving entries.
    let mut omitted = vec![false; dirs.len()];
    for index in 1..dirs.len() {
        let dir = &dirs[index];
        omitted[index] = omitted[dir.parent]
            || options.omit_from_path_table.iter().any(|name| *name == dir.name);
    }
    let mut positions = vec![0usize; dirs.len()];
    let mut table_order = Vec::new();
    for index in 0..dirs.len() {
        if !omitted[index] {
            table_order.push(index);
            positions[index] = table_order.len();
        }
    }

    let mut l_table = Vec::new();
    let mut m_table = Vec::new();
    for &index in &table_order {
        let dir = &dirs[index];
        let name: &[u8] = if index == 0 { &[0] } else { dir.name.as_bytes() };
        let parent = positions[dir.parent] as u16;
        push_table_entry(&mut l_table, name, parent, dir_extents[index], false);
        push_table_entry(&mut m_table, name, parent, dir_extents[index], true);
    }
    assert!(l_table.len() <= SECTOR, "path table spills past its sector");

    let mut image = vec![0u8; total_sectors as usize * SECTOR];

    let mut root_record = Vec::new();
    push_record(
        &mut root_record,
        &[0x00],
        dir_extents[0],
        extent_lens[0] as u32,
        DIRECTORY_FLAG,
    );
    let pvd = build_pvd(total_sectors, l_table.len() as u32, &root_record);
    write_sector(&mut image, PVD_SECTOR, &pvd);

    let mut supplementary = vec![0u8; SECTOR];
    supplementary[0] = 2;
    supplementary[1..6].copy_from_slice(b"CD001");
    supplementary[6] = 1;
    write_sector(&mut image, 17, &supplementary);

    let mut terminator = vec![0u8; SECTOR];
    terminator[0] = 255;
    terminator[1..6].copy_from_slice(b"CD001");
    terminator[6] = 1;
    write_sector(&mut image, TERMINATOR_SECTOR, &terminator);

    write_sector(&mut image, L_TABLE_SECTOR, &l_table);
    write_sector(&mut image, M_TABLE_SECTOR, &m_table);

    for index in 0..dirs.len() {
        let extent = build_directory_extent(index, &dirs, &dir_extents, &extent_lens);
        write_at(&mut image, dir_extents[index], &extent);
    }
    for dir in &dirs {
        for child in &dir.children {
            if let FlatChild::File { content, extent, .. } = child {
                write_at(&mut image, *extent, content);
            }
        }
    }

    image
}

/// Persist image bytes for the reader, which works from a file path.
pub fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

/// Overwrite a both-endian u32 field: little half at `offset`, big half
/// right after it.
pub fn patch_u32_both(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    bytes[offset + 4..offset + 8].copy_from_slice(&value.to_be_bytes());
}

struct FlatDir {
    name: String,
    parent: usize,
    children: Vec<FlatChild>,
}

enum FlatChild {
    File {
        name: String,
        content: Vec<u8>,
        extent: u32,
    },
    Dir(usize),
}

fn flatten(root_children: Vec<Node>) -> Vec<FlatDir> {
    let mut dirs = vec![FlatDir {
        name: String::new(),
        parent: 0,
        children: Vec::new(),
    }];
    let mut queue = VecDeque::from([(0usize, root_children)]);
    while let Some((index, children)) = queue.pop_front() {
        for child in children {
            match child {
                Node::File { name, content } => dirs[index].children.push(FlatChild::File {
                    name,
                    content,
                    extent: 0,
                }),
                Node::Dir { name, children } => {
                    let child_index = dirs.len();
                    dirs.push(FlatDir {
                        name,
                        parent: index,
                        children: Vec::new(),
                    });
                    dirs[index].children.push(FlatChild::Dir(child_index));
                    queue.push_back((child_index, children));
                }
            }
        }
    }
    dirs
}

fn record_size(identifier_len: usize) -> usize {
    33 + identifier_len + if identifier_len % 2 == 0 { 1 } else { 0 }
}

fn record_sizes(dir: &FlatDir, dirs: &[FlatDir]) -> Vec<usize> {
    let mut sizes = vec![record_size(1), record_size(1)];
    for child in &dir.children {
        let identifier_len = match child {
            FlatChild::File { name, .. } => name.len() + 2,
            FlatChild::Dir(index) => dirs[*index].name.len(),
        };
        sizes.push(record_size(identifier_len));
    }
    sizes
}

/// Simulate sector packing: a record that does not fit in the current
/// sector starts the next one. The extent is whole sectors.
fn packed_size(sizes: &[usize]) -> usize {
    let mut length = 0usize;
    for &size in sizes {
        let remaining = SECTOR - length % SECTOR;
        if size > remaining {
            length += remaining;
        }
        length += size;
    }
    length.div_ceil(SECTOR) * SECTOR
}

fn push_u16_both(bytes: &mut Vec<u8>, value: u16) {
    bytes.extend_from_slice(&value.to_le_bytes());
    bytes.extend_from_slice(&value.to_be_bytes());
}

fn push_u32_both(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_le_bytes());
    bytes.extend_from_slice(&value.to_be_bytes());
}

/// Append one directory record. Recording time is 2020-08-15 12:30:45
/// at zero offset from GMT.
fn push_record(bytes: &mut Vec<u8>, identifier: &[u8], extent: u32, length: u32, flags: u8) {
    let start = bytes.len();
    bytes.push(record_size(identifier.len()) as u8);
    bytes.push(0);
    push_u32_both(bytes, extent);
    push_u32_both(bytes, length);
    bytes.extend_from_slice(&[120, 8, 15, 12, 30, 45, 0]);
    bytes.push(flags);
    bytes.push(0);
    bytes.push(0);
    push_u16_both(bytes, 1);
    bytes.push(identifier.len() as u8);
    bytes.extend_from_slice(identifier);
    if identifier.len() % 2 == 0 {
        bytes.push(0);
    }
    assert_eq!(bytes.len() - start, record_size(identifier.len()));
}

fn push_packed_record(bytes: &mut Vec<u8>, identifier: &[u8], extent: u32, length: u32, flags: u8) {
    let remaining = SECTOR - bytes.len() % SECTOR;
    if record_size(identifier.len()) > remaining {
        bytes.resize(bytes.len() + remaining, 0);
    }
    push_record(bytes, identifier, extent, length, flags);
}

fn push_table_entry(bytes: &mut Vec<u8>, name: &[u8], parent: u16, extent: u32, big_endian: bool) {
    bytes.push(name.len() as u8);
    bytes.push(0);
    if big_endian {
        bytes.extend_from_slice(&extent.to_be_bytes());
        bytes.extend_from_slice(&parent.to_be_bytes());
    } else {
        bytes.extend_from_slice(&extent.to_le_bytes());
        bytes.extend_from_slice(&parent.to_le_bytes());
    }
    bytes.extend_from_slice(name);
    if name.len() % 2 == 1 {
        bytes.push(0);
    }
}

fn build_directory_extent(
    self_index: usize,
    dirs: &[FlatDir],
    dir_extents: &[u32],
    extent_lens: &[usize],
) -> Vec<u8> {
    let dir = &dirs[self_index];
    let mut bytes = Vec::new();
    push_packed_record(
        &mut bytes,
        &[0x00],
        dir_extents[self_index],
        extent_lens[self_index] as u32,
        DIRECTORY_FLAG,
    );
    push_packed_record(
        &mut bytes,
        &[0x01],
        dir_extents[dir.parent],
        extent_lens[dir.parent] as u32,
        DIRECTORY_FLAG,
    );
    for child in &dir.children {
        match child {
            FlatChild::Dir(index) => push_packed_record(
                &mut bytes,
                dirs[*index].name.as_bytes(),
                dir_extents[*index],
                extent_lens[*index] as u32,
                DIRECTORY_FLAG,
            ),
            FlatChild::File {
                name,
                content,
                extent,
            } => {
                let identifier = format!("{};1", name);
                push_packed_record(
                    &mut bytes,
                    identifier.as_bytes(),
                    *extent,
                    content.len() as u32,
                    0,
                );
            }
        }
    }
    let padding = (SECTOR - bytes.len() % SECTOR) % SECTOR;
    bytes.resize(bytes.len() + padding, 0);
    assert_eq!(bytes.len(), extent_lens[self_index]);
    bytes
}

fn build_pvd(total_sectors: u32, table_size: u32, root_record: &[u8]) -> Vec<u8> {
    let mut pvd = vec![0u8; SECTOR];
    pvd[0] = 1;
    pvd[1..6].copy_from_slice(b"CD001");
    pvd[6] = 1;
    write_str(&mut pvd[8..40], "LINUX");
    write_str(&mut pvd[40..72], "SOFTWARE_IMAGE");
    patch_u32_both(&mut pvd, 80, total_sectors);
    patch_u16_both(&mut pvd, 120, 1);
    patch_u16_both(&mut pvd, 124, 1);
    patch_u16_both(&mut pvd, 128, SECTOR as u16);
    patch_u32_both(&mut pvd, 132, table_size);
    pvd[140..144].copy_from_slice(&(L_TABLE_SECTOR as u32).to_le_bytes());
    pvd[148..152].copy_from_slice(&(M_TABLE_SECTOR as u32).to_be_bytes());
    pvd[156..156 + root_record.len()].copy_from_slice(root_record);
    write_str(&mut pvd[190..318], "SOFTWARE_SET");
    write_str(&mut pvd[318..446], "EXAMPLE NETWORKS");
    write_str(&mut pvd[446..574], "BUILD FACTORY");
    write_str(&mut pvd[574..702], "IMAGE BUILDER");
    write_str(&mut pvd[702..740], "");
    write_str(&mut pvd[740..776], "");
    write_str(&mut pvd[776..813], "");
    for slot in 0..4 {
        let start = 813 + slot * 17;
        pvd[start..start + 16].copy_from_slice(b"2020081512304500");
    }
    pvd[881] = 1;
    pvd
}

fn patch_u16_both(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    bytes[offset + 2..offset + 4].copy_from_slice(&value.to_be_bytes());
}

fn write_str(target: &mut [u8], value: &str) {
    for byte in target.iter_mut() {
        *byte = b' ';
    }
    target[..value.len()].copy_from_slice(value.as_bytes());
}

fn write_sector(image: &mut [u8], sector: usize, bytes: &[u8]) {
    assert!(bytes.len() <= SECTOR);
    let start = sector * SECTOR;
    image[start..start + bytes.len()].copy_from_slice(bytes);
}

fn write_at(image: &mut [u8], extent: u32, bytes: &[u8]) {
    let start = extent as usize * SECTOR;
    image[start..start + bytes.len()].copy_from_slice(bytes);
}
