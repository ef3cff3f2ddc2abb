mod test_offer_collision;
mod test_three_way_mesh;
